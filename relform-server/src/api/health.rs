//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use relform_common::ledger::SCHEMA_VERSION;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the ledger cannot be read
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Column layout version of ledger rows written by this build
    pub ledger_schema: u32,
    /// Highest sequence in the ledger
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sequence: Option<u64>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let pipeline = std::sync::Arc::clone(state.controller.pipeline());
    let last_sequence = tokio::task::spawn_blocking(move || pipeline.ledger().last_sequence())
        .await
        .ok()
        .and_then(|r| r.ok());

    Json(HealthResponse {
        status: if last_sequence.is_some() { "ok" } else { "degraded" }.to_string(),
        module: "relform-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        ledger_schema: SCHEMA_VERSION,
        last_sequence,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
