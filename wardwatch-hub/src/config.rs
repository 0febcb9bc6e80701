use crate::error::MonitorError;
use crate::gateway::GatewaySettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Hôte d'écoute commun aux trois listeners
    pub host: String,
    pub ports: PortsConf,
    pub hub: HubConf,
    pub gateway: GatewayConf,
    pub alerts: AlertsConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PortsConf {
    pub udp: u16,
    pub tcp: u16,
    pub ws: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HubConf {
    pub viewer_queue_capacity: usize,
    pub alert_log_capacity: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GatewayConf {
    pub stats_interval_ms: u64,
    pub send_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AlertsConf {
    pub max_frame_bytes: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            ports: PortsConf::default(),
            hub: HubConf::default(),
            gateway: GatewayConf::default(),
            alerts: AlertsConf::default(),
        }
    }
}

impl Default for PortsConf {
    fn default() -> Self {
        Self { udp: 9999, tcp: 9998, ws: 8000 }
    }
}

impl Default for HubConf {
    fn default() -> Self {
        Self { viewer_queue_capacity: 256, alert_log_capacity: 1000 }
    }
}

impl Default for GatewayConf {
    fn default() -> Self {
        Self { stats_interval_ms: 5000, send_timeout_ms: 10_000 }
    }
}

impl Default for AlertsConf {
    fn default() -> Self {
        Self { max_frame_bytes: 64 * 1024 }
    }
}

impl MonitorConfig {
    pub fn from_yaml(txt: &str) -> Result<Self, MonitorError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(txt)?)
    }

    /// Surcharges par variables d'environnement (APP_HOST, UDP_PORT, TCP_PORT, APP_PORT)
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("APP_HOST").filter(|h| !h.trim().is_empty()) {
            self.host = host;
        }
        for (var, slot) in [
            ("UDP_PORT", &mut self.ports.udp),
            ("TCP_PORT", &mut self.ports.tcp),
            ("APP_PORT", &mut self.ports.ws),
        ] {
            if let Some(raw) = lookup(var) {
                match raw.trim().parse::<u16>() {
                    Ok(port) => *slot = port,
                    Err(_) => warn!("ignoring {var}={raw}: not a port number"),
                }
            }
        }
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            stats_interval: Duration::from_millis(self.gateway.stats_interval_ms.max(1)),
            send_timeout: Duration::from_millis(self.gateway.send_timeout_ms.max(1)),
        }
    }
}

pub async fn load_config_from<P: AsRef<Path>>(path: P) -> MonitorConfig {
    let path = path.as_ref();
    if !path.exists() {
        warn!("no {} found, using default config", path.display());
        return MonitorConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_else(|e| {
        warn!("cannot read {}: {e}", path.display());
        String::new()
    });
    MonitorConfig::from_yaml(&txt).unwrap_or_else(|e| {
        warn!("{e}, using default config");
        MonitorConfig::default()
    })
}

/// Fichier désigné par WARDWATCH_CONFIG (défaut wardwatch.yaml) + surcharges env
pub async fn load_config() -> MonitorConfig {
    let path = std::env::var("WARDWATCH_CONFIG").unwrap_or_else(|_| "wardwatch.yaml".into());
    let mut cfg = load_config_from(&path).await;
    cfg.apply_env_overrides(|var| std::env::var(var).ok());
    cfg
}
