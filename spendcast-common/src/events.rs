//! Structured event logging
//!
//! Every pipeline stage reports start/skip/complete/fail through
//! [`EventLogger`]. Human-readable trace goes to `tracing`; structured
//! events additionally fan out to the registered [`EventSink`]s so that
//! failures can be audited after the fact without re-running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Structured event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    PipelineStarted,
    PipelineCompleted,
    PipelineFailed,
    NoData,
    DataIngested,
    ValidationSkipped,
    ValidationPassed,
    ValidationFailed,
    PreprocessSkipped,
    PreprocessCompleted,
    TrainingSkipped,
    TrainingCompleted,
    ModelPromoted,
    ModelRolledBack,
    ModelLoaded,
    ModelUnavailable,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PipelineStarted => "PIPELINE_STARTED",
            EventKind::PipelineCompleted => "PIPELINE_COMPLETED",
            EventKind::PipelineFailed => "PIPELINE_FAILED",
            EventKind::NoData => "NO_DATA",
            EventKind::DataIngested => "DATA_INGESTED",
            EventKind::ValidationSkipped => "VALIDATION_SKIPPED",
            EventKind::ValidationPassed => "VALIDATION_PASSED",
            EventKind::ValidationFailed => "VALIDATION_FAILED",
            EventKind::PreprocessSkipped => "PREPROCESS_SKIPPED",
            EventKind::PreprocessCompleted => "PREPROCESS_COMPLETED",
            EventKind::TrainingSkipped => "TRAINING_SKIPPED",
            EventKind::TrainingCompleted => "TRAINING_COMPLETED",
            EventKind::ModelPromoted => "MODEL_PROMOTED",
            EventKind::ModelRolledBack => "MODEL_ROLLED_BACK",
            EventKind::ModelLoaded => "MODEL_LOADED",
            EventKind::ModelUnavailable => "MODEL_UNAVAILABLE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured event as written to sinks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub payload: Value,
}

/// Destination for structured events
pub trait EventSink: Send + Sync {
    fn record(&self, event: &EventRecord) -> std::io::Result<()>;
}

/// Appends one JSON object per line
pub struct JsonlSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

impl EventSink for JsonlSink {
    fn record(&self, event: &EventRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        // Poisoning only means another writer panicked mid-append; keep writing.
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

/// Keeps events in memory
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<EventRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<EventRecord> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Kinds in emission order
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &EventRecord) -> std::io::Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}

/// Logging interface shared by every stage.
///
/// Cheap to clone; clones share the same sinks.
#[derive(Clone, Default)]
pub struct EventLogger {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventLogger {
    /// Logger with no structured sinks (tracing only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Logger writing structured events to a JSONL file
    pub fn with_jsonl(path: impl Into<PathBuf>) -> Self {
        Self::new().with_sink(Arc::new(JsonlSink::new(path)))
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Human-readable trace line
    pub fn log_message(&self, text: impl AsRef<str>) {
        info!("{}", text.as_ref());
    }

    /// Structured event; sink failures are logged and swallowed
    pub fn log_event(&self, kind: EventKind, payload: Value) {
        info!(event = %kind, payload = %payload, "pipeline event");

        let record = EventRecord {
            timestamp: Utc::now(),
            kind,
            payload,
        };
        for sink in &self.sinks {
            if let Err(e) = sink.record(&record) {
                warn!("Failed to record {} event: {}", kind, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_serializes_as_reason_code() {
        let value = serde_json::to_value(EventKind::ValidationFailed).unwrap();
        assert_eq!(value, json!("VALIDATION_FAILED"));
        assert_eq!(EventKind::NoData.to_string(), "NO_DATA");
    }

    #[test]
    fn test_memory_sink_receives_events_in_order() {
        let sink = Arc::new(MemorySink::new());
        let logger = EventLogger::new().with_sink(sink.clone());

        logger.log_event(EventKind::PipelineStarted, json!({}));
        logger.log_event(EventKind::NoData, json!({"last_id": 37}));

        assert_eq!(sink.kinds(), vec![EventKind::PipelineStarted, EventKind::NoData]);
        assert_eq!(sink.events()[1].payload["last_id"], 37);
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("events.jsonl");
        let logger = EventLogger::with_jsonl(&path);

        logger.log_event(EventKind::ModelPromoted, json!({"version": "v1"}));
        logger.log_event(EventKind::ModelLoaded, json!({"version": "v1"}));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: EventRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.kind, EventKind::ModelPromoted);
        assert_eq!(first.payload["version"], "v1");
    }
}
