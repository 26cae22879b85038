//! spendcast-pipeline: incremental extraction, validation, training and promotion
//!
//! Each invocation processes at most one micro-batch. The cursor advance and
//! the model promotion belong to the same unit of work, so a run either
//! leaves a new active model and an advanced cursor, or changes nothing.

pub mod cursor;
pub mod extract;
pub mod run;
pub mod train;
pub mod transform;
pub mod validate;

pub use cursor::CursorStore;
pub use extract::{Batch, BatchExtractor, ExtractionUnit};
pub use run::{Pipeline, RunOutcome};
pub use train::{TrainOutcome, Trainer, TrainingConfig};
pub use transform::Transformer;
pub use validate::{ValidatedBatch, Validation, Validator};
