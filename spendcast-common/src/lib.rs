//! # Spendcast Common Library
//!
//! Shared code for the pipeline and serving binaries:
//! - Error types (including structured validation failures)
//! - Configuration loading and root folder resolution
//! - Structured event logging (`EventLogger`)
//! - Schema contract and the tabular `Frame` type
//! - Database bootstrap
//! - Regression model artifact and the model registry

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod features;
pub mod frame;
pub mod model;
pub mod registry;
pub mod schema;

pub use error::{Error, Result, ValidationError};
pub use events::{EventKind, EventLogger};
pub use features::{FeatureColumn, FeatureMatrix, FeatureValues, TargetVector};
pub use frame::{Column, Frame, Value};
pub use model::{ModelMetrics, RegressionModel};
pub use registry::ModelRegistry;
pub use schema::{ColumnKind, SchemaContract};
