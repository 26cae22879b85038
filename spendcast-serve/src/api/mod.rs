//! HTTP API handlers for spendcast-serve

pub mod health;
pub mod predict;
pub mod reload;
pub mod ui;

pub use health::health_routes;
pub use predict::{predict_form, predict_json};
pub use reload::reload_model;
pub use ui::serve_index;
