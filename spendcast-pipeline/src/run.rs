//! One end-to-end pipeline run
//!
//! The extraction unit stays open for the whole run. Rows are pulled,
//! validated, transformed and trained on, the model is promoted, and only
//! then is the cursor advance committed. A failure at any stage rolls the
//! unit back, so the cursor still points before the batch and the next run
//! sees the same rows again.
//!
//! Promotion happens before the cursor commit. If the commit itself fails
//! the batch is reprocessed on the next run (at-least-once), but a batch is
//! never skipped.

use crate::extract::{BatchExtractor, ExtractionUnit};
use crate::train::{TrainOutcome, Trainer, TrainingConfig};
use crate::transform::Transformer;
use crate::validate::{Validation, Validator};
use serde_json::json;
use spendcast_common::config::{Layout, SourceConfig};
use spendcast_common::{
    Error, EventKind, EventLogger, ModelMetrics, ModelRegistry, Result, SchemaContract,
};
use sqlx::SqlitePool;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// How a run that did not fail ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No rows after the cursor; nothing changed
    NoData { cursor: i64 },
    /// Rows were consumed but there was nothing to fit
    TrainingSkipped { rows: usize, cursor: i64 },
    /// A new model version is active and the cursor advanced
    Promoted {
        version: String,
        rows: usize,
        cursor: i64,
        metrics: Option<ModelMetrics>,
    },
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::NoData { .. } => "no_data",
            RunOutcome::TrainingSkipped { .. } => "training_skipped",
            RunOutcome::Promoted { .. } => "promoted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    LoadConfig,
    Extract,
    Validate,
    Transform,
    Train,
    Promote,
    Commit,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::LoadConfig => "load_config",
            Stage::Extract => "extract",
            Stage::Validate => "validate",
            Stage::Transform => "transform",
            Stage::Train => "train",
            Stage::Promote => "promote",
            Stage::Commit => "commit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Pipeline {
    extractor: BatchExtractor,
    schema_path: PathBuf,
    training_path: PathBuf,
    registry: ModelRegistry,
    events: EventLogger,
}

impl Pipeline {
    pub fn new(
        pool: SqlitePool,
        source: SourceConfig,
        schema_path: impl Into<PathBuf>,
        training_path: impl Into<PathBuf>,
        registry: ModelRegistry,
        events: EventLogger,
    ) -> Result<Self> {
        Ok(Self {
            extractor: BatchExtractor::new(pool, source, events.clone())?,
            schema_path: schema_path.into(),
            training_path: training_path.into(),
            registry,
            events,
        })
    }

    /// Pipeline over the standard root-folder layout
    pub fn from_layout(
        pool: SqlitePool,
        source: SourceConfig,
        layout: &Layout,
        events: EventLogger,
    ) -> Result<Self> {
        let registry = ModelRegistry::new(&layout.models, events.clone());
        Self::new(pool, source, &layout.schema, &layout.training, registry, events)
    }

    /// Run every stage once over the next batch
    pub async fn run_once(&self) -> Result<RunOutcome> {
        self.events.log_message("Pipeline run started.");
        self.events.log_event(
            EventKind::PipelineStarted,
            json!({ "source": self.extractor.source().table }),
        );

        let mut stage = Stage::LoadConfig;
        match self.execute(&mut stage).await {
            Ok(outcome) => {
                let mut payload = json!({ "outcome": outcome.label() });
                match &outcome {
                    RunOutcome::NoData { cursor } => payload["cursor"] = json!(cursor),
                    RunOutcome::TrainingSkipped { rows, cursor } => {
                        payload["rows"] = json!(rows);
                        payload["cursor"] = json!(cursor);
                    }
                    RunOutcome::Promoted {
                        version, rows, cursor, ..
                    } => {
                        payload["version"] = json!(version);
                        payload["rows"] = json!(rows);
                        payload["cursor"] = json!(cursor);
                    }
                }
                self.events.log_message(format!("Pipeline run completed: {}.", outcome.label()));
                self.events.log_event(EventKind::PipelineCompleted, payload);
                Ok(outcome)
            }
            Err(e) => {
                let mut payload = json!({ "stage": stage.as_str(), "reason": e.to_string() });
                if let Error::Validation(v) = &e {
                    payload["validation"] = json!(v.reason());
                }
                self.events.log_message(format!("Pipeline failed during {}: {}", stage, e));
                self.events.log_event(EventKind::PipelineFailed, payload);
                Err(e)
            }
        }
    }

    async fn execute(&self, stage: &mut Stage) -> Result<RunOutcome> {
        let schema_path = self.schema_path.clone();
        let training_path = self.training_path.clone();
        let (schema, training) = blocking(move || {
            Ok((SchemaContract::load(&schema_path)?, load_training_config(&training_path)?))
        })
        .await?;

        *stage = Stage::Extract;
        let mut unit = self.extractor.begin().await?;

        match self.process(&mut unit, &schema, &training, stage).await {
            Ok(Some(outcome)) => {
                *stage = Stage::Commit;
                unit.commit().await?;
                Ok(outcome)
            }
            Ok(None) => {
                let cursor = unit.cursor().await?;
                unit.rollback().await?;
                Ok(RunOutcome::NoData { cursor })
            }
            Err(e) => {
                if let Err(rollback_err) = unit.rollback().await {
                    warn!("Rollback after failed {} stage also failed: {}", stage, rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Stages between pull and commit; `None` when there was nothing to pull
    async fn process(
        &self,
        unit: &mut ExtractionUnit<'_>,
        schema: &SchemaContract,
        training: &TrainingConfig,
        stage: &mut Stage,
    ) -> Result<Option<RunOutcome>> {
        let Some(batch) = unit.pull().await? else {
            return Ok(None);
        };
        let cursor = batch.new_cursor();
        let rows = batch.num_rows();

        *stage = Stage::Validate;
        let validated = match Validator::new(schema, &self.events).validate(batch.into_frame())? {
            Validation::Passed(validated) => validated,
            Validation::Empty => return Ok(Some(RunOutcome::TrainingSkipped { rows: 0, cursor })),
        };

        *stage = Stage::Transform;
        let (x, y) = Transformer::new(schema, &self.events).transform(&validated)?;

        *stage = Stage::Train;
        let config = training.clone();
        let events = self.events.clone();
        let target = schema.target().to_string();
        let trained = blocking(move || Trainer::new(&config, &events).train(&x, &y, &target)).await?;
        let model = match trained {
            TrainOutcome::Trained(model) => model,
            TrainOutcome::Skipped => return Ok(Some(RunOutcome::TrainingSkipped { rows, cursor })),
        };

        *stage = Stage::Promote;
        let version = ModelRegistry::next_version_id();
        let metrics = model.metrics;
        let registry = self.registry.clone();
        let promoted = version.clone();
        let path = blocking(move || registry.promote(&model, &promoted)).await?;
        info!("Promoted {} ({})", version, path.display());

        Ok(Some(RunOutcome::Promoted {
            version,
            rows,
            cursor,
            metrics,
        }))
    }
}

/// Run file or CPU-bound work off the async worker threads
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {}", e)))?
}

/// A missing training document falls back to defaults
fn load_training_config(path: &Path) -> Result<TrainingConfig> {
    if path.exists() {
        TrainingConfig::load(path)
    } else {
        warn!("Training config {} not found, using defaults", path.display());
        Ok(TrainingConfig::default())
    }
}
