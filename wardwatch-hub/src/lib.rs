/**
 * WARDWATCH HUB - Monitoring temps réel de constantes vitales simulées
 *
 * ARCHITECTURE :
 * - telemetry : UDP, constantes périodiques (best effort)
 * - alerts    : TCP, alertes cliniques (fiable, trames '\n')
 * - hub       : état unique + publication ordonnée des changements
 * - gateway   : WebSocket vers les dashboards (snapshot puis incréments)
 * - http      : routes du port viewer
 * - server    : bind des trois ports + cycle de vie
 */

pub mod alerts;
pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod hub;
pub mod models;
pub mod server;
pub mod state;
pub mod telemetry;

pub use config::{load_config, MonitorConfig};
pub use error::{DecodeError, MonitorError};
pub use hub::{Hub, HubEvent, HubSettings, Subscription, SubscriptionEnded};
pub use models::{Alert, AlertKind, CnInfo, ConnectionStats, Severity, TelemetrySample, Vitals};
pub use server::Monitor;
pub use state::WorldSnapshot;
