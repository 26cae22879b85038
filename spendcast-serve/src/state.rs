//! Serving state: the active model and its hot-swap
//!
//! The current [`Snapshot`] sits behind an `RwLock<Arc<_>>`. Requests clone
//! the `Arc` and keep using that snapshot for their whole duration, so a
//! reload never changes the model under an in-flight prediction. Loading
//! happens outside the lock; the swap itself is a single pointer write.

use chrono::{DateTime, Utc};
use serde_json::json;
use spendcast_common::{Error, EventKind, EventLogger, ModelRegistry, RegressionModel};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Whether a model can answer predictions
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    /// Nothing loaded yet
    Uninitialized,
    /// Loaded, but there is no usable active version
    NoModel { reason: String },
    Ready {
        version: String,
        model: RegressionModel,
    },
}

impl Readiness {
    pub fn label(&self) -> &'static str {
        match self {
            Readiness::Uninitialized => "UNINITIALIZED",
            Readiness::NoModel { .. } => "NO_MODEL",
            Readiness::Ready { .. } => "READY",
        }
    }
}

/// Immutable view of the serving state at one point in time
#[derive(Debug, Clone)]
pub struct Snapshot {
    readiness: Readiness,
    loaded_at: DateTime<Utc>,
}

impl Snapshot {
    fn new(readiness: Readiness) -> Self {
        Self {
            readiness,
            loaded_at: Utc::now(),
        }
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn active_version(&self) -> Option<&str> {
        match &self.readiness {
            Readiness::Ready { version, .. } => Some(version),
            _ => None,
        }
    }

    pub fn model(&self) -> Option<&RegressionModel> {
        match &self.readiness {
            Readiness::Ready { model, .. } => Some(model),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.readiness, Readiness::Ready { .. })
    }
}

pub struct ServingState {
    registry: ModelRegistry,
    events: EventLogger,
    current: RwLock<Arc<Snapshot>>,
    reload_lock: Mutex<()>,
}

impl ServingState {
    pub fn new(registry: ModelRegistry, events: EventLogger) -> Self {
        Self {
            registry,
            events,
            current: RwLock::new(Arc::new(Snapshot::new(Readiness::Uninitialized))),
            reload_lock: Mutex::new(()),
        }
    }

    /// Snapshot to use for one request
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    /// Resolve the pointer, load its artifact and publish the result.
    ///
    /// Never fails: any problem with the pointer or artifact publishes
    /// `NoModel`. Concurrent calls are serialized so they publish in order.
    pub async fn load_current(&self) -> Arc<Snapshot> {
        let _guard = self.reload_lock.lock().await;

        let registry = self.registry.clone();
        let readiness = match tokio::task::spawn_blocking(move || read_active(&registry)).await {
            Ok(readiness) => readiness,
            Err(e) => Readiness::NoModel {
                reason: format!("loader task failed: {}", e),
            },
        };

        match &readiness {
            Readiness::Ready { version, .. } => {
                self.events.log_message(format!("Loaded model version {}", version));
                self.events.log_event(EventKind::ModelLoaded, json!({ "version": version }));
            }
            Readiness::NoModel { reason } => {
                self.events.log_message(format!("No model available: {}", reason));
                self.events.log_event(EventKind::ModelUnavailable, json!({ "reason": reason }));
            }
            Readiness::Uninitialized => {}
        }

        let snapshot = Arc::new(Snapshot::new(readiness));
        *self.current.write().await = snapshot.clone();
        snapshot
    }

    /// Re-read the active version pointer and swap in whatever it names
    pub async fn reload(&self) -> Arc<Snapshot> {
        info!("Model reload requested");
        self.load_current().await
    }
}

fn read_active(registry: &ModelRegistry) -> Readiness {
    let version = match registry.current_version() {
        Ok(Some(version)) => version,
        Ok(None) => {
            return Readiness::NoModel {
                reason: "no active version".to_string(),
            }
        }
        Err(e) => {
            warn!("Failed to read active version pointer: {}", e);
            return Readiness::NoModel {
                reason: format!("unreadable pointer: {}", e),
            };
        }
    };

    match registry.load(&version) {
        Ok(model) => Readiness::Ready { version, model },
        Err(Error::NotFound(_)) => Readiness::NoModel {
            reason: format!("artifact for {} is missing", version),
        },
        Err(e) => {
            warn!("Artifact for {} could not be loaded: {}", version, e);
            Readiness::NoModel {
                reason: format!("artifact for {} is invalid: {}", version, e),
            }
        }
    }
}
