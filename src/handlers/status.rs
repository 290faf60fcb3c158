//! System status handler

use std::sync::Arc;

use axum::{extract::State, response::Json};

use crate::server::AppState;
use crate::status::SystemStatus;

/// Probe ports, uptime and battery. Never fails; broken probes yield `null`.
pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    Json(state.probe.snapshot().await)
}
