/**
 * BROADCAST GATEWAY - Diffusion temps réel vers les dashboards (WebSocket)
 *
 * RÔLE :
 * Relie chaque viewer au hub. À la connexion : snapshot complet, puis chaque
 * événement du hub dans l'ordre, plus un "cn_stats" périodique.
 *
 * FONCTIONNEMENT :
 * - Une tâche par viewer (callback `on_upgrade` d'axum)
 * - `Hub::attach` fournit snapshot + abonnement atomiquement
 * - File bornée par viewer côté hub ; débordement => déconnexion, le
 *   dashboard se reconnecte et repart d'un snapshot frais
 * - Chaque envoi est borné par `send_timeout` : un socket bloqué est coupé
 * - Les messages du client sont lus (close/ping) mais ignorés
 */

use crate::hub::{Hub, HubEvent, SubscriptionEnded};
use crate::models::{Alert, CnInfo, ConnectionStats, PatientId, TelemetrySample};
use crate::state::WorldSnapshot;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct GatewaySettings {
    pub stats_interval: Duration,
    pub send_timeout: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            stats_interval: Duration::from_secs(5),
            send_timeout: Duration::from_secs(10),
        }
    }
}

/// Messages serveur -> viewer, discriminés par "type", contenu dans "data"
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ViewerMessage {
    Snapshot(SnapshotData),
    Telemetry(TelemetrySample),
    Alert(Alert),
    CnStats(CnStats),
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotData {
    pub patients: BTreeMap<PatientId, TelemetrySample>,
    pub alerts: Vec<Alert>,
    pub cn_info: CnInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct CnStats {
    /// Connexions d'alertes ouvertes en ce moment
    pub tcp_connections: u64,
    pub tcp_connections_accepted: u64,
    pub udp_packets_received: u64,
    pub viewers_connected: u64,
    pub udp_port: u16,
    pub tcp_port: u16,
    pub ws_port: u16,
}

impl From<WorldSnapshot> for ViewerMessage {
    fn from(snapshot: WorldSnapshot) -> Self {
        ViewerMessage::Snapshot(SnapshotData {
            patients: snapshot.patients,
            alerts: snapshot.alerts,
            cn_info: snapshot.stats.ports,
        })
    }
}

impl From<HubEvent> for ViewerMessage {
    fn from(event: HubEvent) -> Self {
        match event {
            HubEvent::Telemetry(sample) => ViewerMessage::Telemetry(sample),
            HubEvent::Alert(alert) => ViewerMessage::Alert(alert),
        }
    }
}

impl From<ConnectionStats> for ViewerMessage {
    fn from(stats: ConnectionStats) -> Self {
        ViewerMessage::CnStats(CnStats {
            tcp_connections: stats.tcp_connections_active,
            tcp_connections_accepted: stats.tcp_connections_accepted,
            udp_packets_received: stats.udp_packets_received,
            viewers_connected: stats.viewers_connected,
            udp_port: stats.ports.udp_port,
            tcp_port: stats.ports.tcp_port,
            ws_port: stats.ports.ws_port,
        })
    }
}

#[derive(Debug, thiserror::Error)]
enum SendFailure {
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),
    #[error("socket error: {0}")]
    Socket(axum::Error),
    #[error("send timed out")]
    TimedOut,
}

async fn send_message<S>(sink: &mut S, message: ViewerMessage, send_timeout: Duration) -> Result<(), SendFailure>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let text = serde_json::to_string(&message).map_err(SendFailure::Encode)?;
    match timeout(send_timeout, sink.send(Message::Text(text.into()))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SendFailure::Socket(e)),
        Err(_) => Err(SendFailure::TimedOut),
    }
}

/// Cycle de vie complet d'un viewer, de l'upgrade à la déconnexion
pub async fn run_viewer_session(socket: WebSocket, hub: Hub, settings: GatewaySettings) {
    let viewer_id = Uuid::new_v4();
    let (snapshot, mut subscription) = hub.attach();
    let (mut sink, mut incoming) = socket.split();
    info!(
        viewer = %viewer_id,
        patients = snapshot.patients.len(),
        "viewer attached (subscriber {})",
        subscription.id()
    );

    if let Err(e) = send_message(&mut sink, snapshot.into(), settings.send_timeout).await {
        debug!(viewer = %viewer_id, "snapshot not delivered: {e}");
        return;
    }

    let mut stats_tick = interval_at(Instant::now() + settings.stats_interval, settings.stats_interval);

    loop {
        let outcome = tokio::select! {
            event = subscription.recv() => match event {
                Ok(event) => send_message(&mut sink, event.into(), settings.send_timeout).await,
                Err(SubscriptionEnded::Overflowed) => {
                    warn!(viewer = %viewer_id, "viewer too slow, queue overflowed: disconnecting");
                    break;
                }
                Err(SubscriptionEnded::Closed) => break,
            },
            _ = stats_tick.tick() => {
                send_message(&mut sink, hub.stats().into(), settings.send_timeout).await
            }
            frame = incoming.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => Ok(()),
            },
        };

        if let Err(failure) = outcome {
            match failure {
                SendFailure::TimedOut => warn!(viewer = %viewer_id, "viewer send timed out: disconnecting"),
                other => debug!(viewer = %viewer_id, "viewer send failed: {other}"),
            }
            break;
        }
    }

    // désabonnement immédiat, avant la fermeture du socket
    drop(subscription);
    let _ = timeout(settings.send_timeout, sink.close()).await;
    info!(viewer = %viewer_id, "viewer detached");
}
