/**
 * SURFACE HTTP - Port viewer (WebSocket + inspection en lecture seule)
 *
 * ROUTES :
 * - GET /ws              : canal push des dashboards (gateway)
 * - GET /health          : "ok"
 * - GET /stats           : compteurs réseau courants
 * - GET /patients        : derniers échantillons + ancienneté
 * - GET /patients/{id}   : un patient (404 si inconnu)
 * - GET /alerts          : journal d'alertes, ordre d'observation
 *
 * Toutes les lectures passent par le hub (snapshot/stats), jamais par l'état brut.
 */

use crate::gateway::{run_viewer_session, GatewaySettings};
use crate::hub::Hub;
use crate::models::{Alert, ConnectionStats, TelemetrySample, Vitals};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::{routing::get, Json, Router};
use time::OffsetDateTime;

/// Au-delà, un échantillon est signalé "stale" dans les vues REST
const STALE_AFTER_SECS: f64 = 30.0;

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub gateway: GatewaySettings,
}

#[derive(serde::Serialize)]
struct PatientView {
    patient_id: String,
    vitals: Vitals,
    timestamp: f64,
    stale: bool,
    stale_for_seconds: i64,
}

fn now_epoch_secs() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}

fn to_view(sample: &TelemetrySample, now: f64) -> PatientView {
    let age = (now - sample.timestamp).max(0.0);
    PatientView {
        patient_id: sample.patient_id.clone(),
        vitals: sample.vitals.clone(),
        timestamp: sample.timestamp,
        stale: age > STALE_AFTER_SECS,
        stale_for_seconds: age as i64,
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(viewer_socket))
        .route("/health", get(|| async { "ok" }))
        .route("/stats", get(get_stats))
        .route("/patients", get(get_patients))
        .route("/patients/{id}", get(get_patient))
        .route("/alerts", get(get_alerts))
        .with_state(app_state)
}

// GET /ws (upgrade vers le canal viewer)
async fn viewer_socket(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| run_viewer_session(socket, app.hub, app.gateway))
}

// GET /stats
async fn get_stats(State(app): State<AppState>) -> Json<ConnectionStats> {
    Json(app.hub.stats())
}

// GET /patients (liste)
async fn get_patients(State(app): State<AppState>) -> Json<Vec<PatientView>> {
    let now = now_epoch_secs();
    let snapshot = app.hub.snapshot();
    Json(snapshot.patients.values().map(|s| to_view(s, now)).collect())
}

// GET /patients/{id} (détail)
async fn get_patient(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PatientView>, StatusCode> {
    let snapshot = app.hub.snapshot();
    let Some(sample) = snapshot.patients.get(&id) else { return Err(StatusCode::NOT_FOUND); };
    Ok(Json(to_view(sample, now_epoch_secs())))
}

// GET /alerts
async fn get_alerts(State(app): State<AppState>) -> Json<Vec<Alert>> {
    Json(app.hub.snapshot().alerts)
}
