/**
 * ALERT LISTENER - Réception TCP des alertes cliniques
 *
 * FONCTIONNEMENT :
 * - Une tâche par connexion acceptée (JoinSet), une connexion lente ne
 *   bloque ni l'accept ni les autres pairs
 * - Trames JSON délimitées par '\n', taille max configurable
 * - Trame illisible : comptée et ignorée ; trame trop grande ou UTF-8
 *   invalide : fin de cette connexion uniquement
 * - Arrêt : l'accept s'arrête et les connexions ouvertes sont avortées
 */

use crate::codec::decode_alert;
use crate::hub::Hub;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Pause après un échec d'accept lié au process (EMFILE, ENFILE...)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(500);

/// Un pair qui abandonne pendant l'accept ne concerne que lui : on repart tout de suite
fn accept_retry_delay(error: &io::Error) -> Duration {
    match error.kind() {
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted => {
            Duration::ZERO
        }
        _ => ACCEPT_BACKOFF,
    }
}

pub async fn run_alert_listener(
    listener: TcpListener,
    hub: Hub,
    max_frame_bytes: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("alert listener running on tcp://{addr}");
    }
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let guard = hub.alert_connection_opened();
                    info!(%peer, "alert connection opened");
                    let hub = hub.clone();
                    connections.spawn(async move {
                        read_alerts(stream, peer, &hub, max_frame_bytes).await;
                        drop(guard);
                        info!(%peer, "alert connection closed");
                    });
                }
                Err(e) => {
                    let delay = accept_retry_delay(&e);
                    warn!("alert accept failed: {e} (retry in {delay:?})");
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            },
        }
    }

    connections.shutdown().await;
    info!("alert listener stopped");
}

/// Lit les trames d'une connexion jusqu'à EOF, erreur de lecture ou violation de framing
pub async fn read_alerts<R>(stream: R, peer: SocketAddr, hub: &Hub, max_frame_bytes: usize)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        // +1 pour laisser passer le '\n' d'une trame de taille max
        let limit = max_frame_bytes as u64 + 1;
        match (&mut reader).take(limit).read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if !line.ends_with('\n') && line.len() > max_frame_bytes {
                    warn!(%peer, "alert frame larger than {max_frame_bytes} bytes, closing connection");
                    break;
                }
                let frame = line.trim();
                if frame.is_empty() {
                    continue;
                }
                match decode_alert(frame) {
                    Ok(alert) => hub.apply_alert(alert),
                    Err(e) => {
                        hub.record_alert_decode_error();
                        debug!(%peer, "alert frame dropped: {e}");
                    }
                }
            }
            Err(e) => {
                debug!(%peer, "alert read ended: {e}");
                break;
            }
        }
    }
}
