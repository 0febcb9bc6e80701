/**
 * CODEC FILAIRE - Télémétrie UDP et alertes TCP
 *
 * FORMAT :
 * - Télémétrie : un document JSON par datagramme
 *   {"patient_id", "vitals": {...}, "timestamp"}
 * - Alertes : un document JSON par ligne (terminée par '\n') sur le flux TCP
 *   {"patient_id", "type", "severity", "message", "timestamp", "vitals"?}
 *
 * Les champs inconnus sont ignorés. Les valeurs vitales ne sont pas bornées.
 */

use crate::error::DecodeError;
use crate::models::{Alert, TelemetrySample};

pub fn decode_telemetry(payload: &[u8]) -> Result<TelemetrySample, DecodeError> {
    let sample: TelemetrySample = serde_json::from_slice(payload)?;
    check_envelope(&sample.patient_id, sample.timestamp)?;
    Ok(sample)
}

pub fn encode_telemetry(sample: &TelemetrySample) -> Result<Vec<u8>, DecodeError> {
    Ok(serde_json::to_vec(sample)?)
}

/// Décode une trame d'alerte déjà découpée (sans le '\n' final)
pub fn decode_alert(frame: &str) -> Result<Alert, DecodeError> {
    let alert: Alert = serde_json::from_str(frame)?;
    check_envelope(&alert.patient_id, alert.timestamp)?;
    Ok(alert)
}

/// Encode une alerte en trame prête à écrire sur le flux (avec '\n')
pub fn encode_alert(alert: &Alert) -> Result<String, DecodeError> {
    let mut frame = serde_json::to_string(alert)?;
    frame.push('\n');
    Ok(frame)
}

fn check_envelope(patient_id: &str, timestamp: f64) -> Result<(), DecodeError> {
    if patient_id.trim().is_empty() {
        return Err(DecodeError::EmptyPatientId);
    }
    if !timestamp.is_finite() {
        return Err(DecodeError::InvalidTimestamp);
    }
    Ok(())
}
