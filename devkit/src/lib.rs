/*!
# Wardwatch DevKit - Clients de protocole et fixtures pour les tests

Bibliothèque facilitant les tests de bout en bout du hub avec:
- Émetteur de télémétrie UDP (un document JSON par datagramme)
- Émetteur d'alertes TCP (une ligne JSON par alerte)
- Client viewer WebSocket (snapshot, telemetry, alert, cn_stats)
- Fixtures JSON conformes au format filaire

Ne dépend pas du hub : seuls les formats filaires sont partagés.
*/

pub mod fixtures;
pub mod senders;
pub mod viewer;

pub use senders::{AlertSender, TelemetrySender};
pub use viewer::ViewerClient;

/// Init logging pour tests (idempotent)
pub fn init_test_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}
