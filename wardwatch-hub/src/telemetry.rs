/**
 * TELEMETRY LISTENER - Réception UDP des constantes périodiques
 *
 * Canal "best effort" : pas d'accusé de réception, datagrammes dupliqués ou
 * désordonnés acceptés tels quels (le dernier arrivé gagne dans le hub).
 * Un datagramme illisible est compté puis jeté, la boucle continue.
 */

use crate::codec::decode_telemetry;
use crate::hub::Hub;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Taille max d'un datagramme UDP
const MAX_DATAGRAM: usize = 65_535;

pub async fn run_telemetry_listener(socket: UdpSocket, hub: Hub, mut shutdown: watch::Receiver<bool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    if let Ok(addr) = socket.local_addr() {
        info!("telemetry listener running on udp://{addr}");
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => match decode_telemetry(&buf[..len]) {
                    Ok(sample) => hub.apply_datagram(sample),
                    Err(e) => {
                        hub.record_udp_decode_error();
                        debug!(%peer, "telemetry datagram dropped: {e}");
                    }
                },
                // ex: ICMP port unreachable remonté par certains OS, non fatal
                Err(e) => warn!("udp receive failed: {e}"),
            },
        }
    }
    info!("telemetry listener stopped");
}
