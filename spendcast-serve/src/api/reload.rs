//! Model reload endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub status: String,
    pub active_version: Option<String>,
}

/// GET /reload
///
/// Swaps in whatever version the pointer names now. A missing or broken
/// artifact leaves the service in NO_MODEL rather than failing the request.
pub async fn reload_model(State(state): State<AppState>) -> Json<ReloadResponse> {
    let snapshot = state.serving.reload().await;
    Json(ReloadResponse {
        status: "Model reloaded".to_string(),
        active_version: snapshot.active_version().map(str::to_string),
    })
}
