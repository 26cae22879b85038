//! spendcast-serve library - prediction service with hot model reload
//!
//! Serves predictions from the active model version and swaps in a newly
//! promoted version on `GET /reload` without restarting.

use axum::Router;
use chrono::{DateTime, Utc};
use spendcast_common::SchemaContract;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{Readiness, ServingState, Snapshot};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub serving: Arc<ServingState>,
    /// Schema contract, used for the input form when no model is loaded
    pub schema: Option<Arc<SchemaContract>>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(serving: Arc<ServingState>, schema: Option<SchemaContract>) -> Self {
        Self {
            serving,
            schema: schema.map(Arc::new),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/", get(api::serve_index))
        .route("/predict", post(api::predict_form))
        .route("/api/predict", post(api::predict_json))
        .route("/reload", get(api::reload_model))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
