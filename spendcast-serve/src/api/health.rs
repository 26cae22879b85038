//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    /// UNINITIALIZED, NO_MODEL or READY
    pub model_state: String,
    pub active_version: Option<String>,
    pub uptime_seconds: i64,
}

/// GET /health
///
/// Answers even when no model is loaded.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.serving.snapshot().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "spendcast-serve".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_state: snapshot.readiness().label().to_string(),
        active_version: snapshot.active_version().map(str::to_string),
        uptime_seconds: (chrono::Utc::now() - state.startup_time).num_seconds(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
