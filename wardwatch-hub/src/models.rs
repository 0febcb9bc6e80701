/**
 * MODÈLE DE DONNÉES - Constantes vitales, alertes et compteurs réseau
 *
 * RÔLE : Définitions partagées entre les listeners, le hub et la gateway.
 * Aucune logique métier ici : les valeurs vitales sont une charge opaque,
 * aucune plausibilité médicale n'est vérifiée.
 */

use serde::{Deserialize, Serialize};

/// Identifiant patient, stable pour toute la session
pub type PatientId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub heart_rate: i32,          // bpm
    pub spo2: f64,                // %
    pub blood_pressure_sys: i32,  // mmHg
    pub blood_pressure_dia: i32,  // mmHg
    pub temperature: f64,         // °C
    pub respiration_rate: i32,    // respirations/min
}

/// Dernières constantes connues d'un patient (un datagramme = un échantillon)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub patient_id: PatientId,
    pub vitals: Vitals,
    /// Secondes depuis l'epoch, telles qu'envoyées par la source
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    #[serde(alias = "THRESHOLD", alias = "Threshold")]
    Threshold,
    #[serde(alias = "DEVICE", alias = "Device")]
    Device,
    #[serde(alias = "MANUAL", alias = "Manual")]
    Manual,
    #[serde(alias = "FEVER", alias = "Fever")]
    Fever,
    #[serde(alias = "HYPOXIA", alias = "Hypoxia")]
    Hypoxia,
    #[serde(alias = "TACHYCARDIA", alias = "Tachycardia")]
    Tachycardia,
    #[serde(alias = "HYPERTENSION", alias = "Hypertension")]
    Hypertension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "LOW", alias = "Low")]
    Low,
    #[serde(alias = "MEDIUM", alias = "Medium")]
    Medium,
    #[serde(alias = "HIGH", alias = "High")]
    High,
    #[serde(alias = "CRITICAL", alias = "Critical")]
    Critical,
}

/// Événement clinique reçu sur le canal fiable. Immuable une fois créé.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub patient_id: PatientId,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitals: Option<Vitals>,
}

impl Alert {
    /// Échantillon équivalent si l'alerte embarque des constantes
    pub fn embedded_sample(&self) -> Option<TelemetrySample> {
        self.vitals.as_ref().map(|vitals| TelemetrySample {
            patient_id: self.patient_id.clone(),
            vitals: vitals.clone(),
            timestamp: self.timestamp,
        })
    }
}

/// Ports d'écoute réellement liés, annoncés aux dashboards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CnInfo {
    pub udp_port: u16,
    pub tcp_port: u16,
    pub ws_port: u16,
}

/// Compteurs monotones du process (sauf les jauges *_active / viewers_connected)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub udp_packets_received: u64,
    pub udp_decode_errors: u64,
    pub tcp_connections_accepted: u64,
    pub tcp_connections_active: u64,
    pub alert_decode_errors: u64,
    pub viewers_connected: u64,
    #[serde(flatten)]
    pub ports: CnInfo,
}
