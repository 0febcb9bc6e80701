/*!
Fixtures JSON au format filaire du hub
*/

use chrono::Utc;
use serde_json::{json, Value};

/// Constantes plausibles, la fréquence cardiaque sert de marqueur dans les tests
pub fn vitals(heart_rate: i64) -> Value {
    json!({
        "heart_rate": heart_rate,
        "spo2": 97.2,
        "blood_pressure_sys": 118,
        "blood_pressure_dia": 76,
        "temperature": 36.8,
        "respiration_rate": 16,
    })
}

pub fn telemetry(patient_id: &str, heart_rate: i64, timestamp: f64) -> Value {
    json!({
        "patient_id": patient_id,
        "vitals": vitals(heart_rate),
        "timestamp": timestamp,
    })
}

/// Alerte sans constantes embarquées (ajouter `alert["vitals"]` au besoin)
pub fn alert(patient_id: &str, kind: &str, severity: &str, message: &str, timestamp: f64) -> Value {
    json!({
        "patient_id": patient_id,
        "type": kind,
        "severity": severity,
        "message": message,
        "timestamp": timestamp,
    })
}

/// Secondes depuis l'epoch, comme les simulateurs
pub fn now_epoch() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
