/*!
Client viewer WebSocket : se comporte comme un dashboard minimal
*/

use anyhow::{bail, Result};
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub struct ViewerClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ViewerClient {
    /// Ex: `ViewerClient::connect("ws://127.0.0.1:8000/ws")`
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url).await?;
        log::info!("🖥️ Viewer connected to {}", url);
        Ok(Self { stream })
    }

    /// Prochain message JSON ; `None` si la connexion est fermée
    pub async fn next_message(&mut self, wait: Duration) -> Result<Option<Value>> {
        let deadline = Instant::now() + wait;
        loop {
            let frame = timeout(deadline.saturating_duration_since(Instant::now()), self.stream.next()).await?;
            match frame {
                Some(Ok(Message::Text(text))) => return Ok(Some(serde_json::from_str(&text)?)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Saute les messages jusqu'au premier du `type` demandé
    pub async fn next_of_type(&mut self, kind: &str, wait: Duration) -> Result<Value> {
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_message(remaining).await? {
                Some(message) if message["type"] == kind => return Ok(message),
                Some(other) => log::debug!("⏭️ Skipping {} while waiting for {}", other["type"], kind),
                None => bail!("connection closed while waiting for '{}'", kind),
            }
        }
    }

    /// Vrai si le serveur ferme la connexion avant `wait`
    pub async fn wait_closed(&mut self, wait: Duration) -> Result<bool> {
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.stream.next()).await {
                Err(_) => return Ok(false),
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => return Ok(true),
                Ok(Some(Ok(_))) => continue,
            }
        }
    }

    /// Ne lit plus rien : simule un dashboard figé (le socket reste ouvert)
    pub fn into_stalled(self) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
        self.stream
    }
}
