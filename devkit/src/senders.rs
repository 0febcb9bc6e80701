/*!
Émetteurs côté "simulateur" : télémétrie UDP et alertes TCP
*/

use anyhow::Result;
use serde_json::Value;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};

/// Envoie des datagrammes de télémétrie vers le listener UDP
pub struct TelemetrySender {
    socket: UdpSocket,
}

impl TelemetrySender {
    pub async fn connect(target: SocketAddr) -> Result<Self> {
        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;
        log::info!("📡 Telemetry sender ready for {}", target);
        Ok(Self { socket })
    }

    pub async fn send(&self, payload: &Value) -> Result<()> {
        self.send_raw(&serde_json::to_vec(payload)?).await
    }

    /// Octets bruts, pour tester les datagrammes invalides
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        self.socket.send(bytes).await?;
        Ok(())
    }
}

/// Connexion d'alertes : une ligne JSON par alerte
pub struct AlertSender {
    stream: TcpStream,
}

impl AlertSender {
    pub async fn connect(target: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(target).await?;
        log::info!("🚨 Alert sender connected to {}", target);
        Ok(Self { stream })
    }

    pub async fn send(&mut self, alert: &Value) -> Result<()> {
        let mut frame = serde_json::to_vec(alert)?;
        frame.push(b'\n');
        self.send_raw(&frame).await
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Ferme proprement le côté écriture (EOF pour le serveur)
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_alert_sender_writes_one_line_per_alert() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut sender = AlertSender::connect(addr).await.unwrap();
        let (server_side, _) = listener.accept().await.unwrap();
        sender.send(&serde_json::json!({"a": 1})).await.unwrap();
        sender.send(&serde_json::json!({"b": "x\ny"})).await.unwrap();
        sender.close().await.unwrap();

        let mut lines = tokio::io::BufReader::new(server_side).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), r#"{"a":1}"#);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), r#"{"b":"x\ny"}"#);
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_telemetry_sender_one_document_per_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = TelemetrySender::connect(receiver.local_addr().unwrap()).await.unwrap();
        sender.send(&serde_json::json!({"patient_id": "P1"})).await.unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], br#"{"patient_id":"P1"}"#);
    }
}
