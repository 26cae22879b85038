//! Batch validation against the schema contract
//!
//! Checks run in a fixed order and stop at the first failure:
//! emptiness, column presence, nulls in required columns, declared types,
//! then minimum constraints. Nothing is coerced or repaired here.

use serde_json::json;
use spendcast_common::{ColumnKind, EventKind, EventLogger, Frame, SchemaContract, ValidationError, Value};

/// A batch that passed every check; only the validator can build one
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBatch(Frame);

impl ValidatedBatch {
    pub fn frame(&self) -> &Frame {
        &self.0
    }

    pub fn num_rows(&self) -> usize {
        self.0.num_rows()
    }

    pub fn into_frame(self) -> Frame {
        self.0
    }
}

/// Result of a validation that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// Nothing to validate; downstream stages skip
    Empty,
    Passed(ValidatedBatch),
}

pub struct Validator<'a> {
    schema: &'a SchemaContract,
    events: &'a EventLogger,
}

impl<'a> Validator<'a> {
    pub fn new(schema: &'a SchemaContract, events: &'a EventLogger) -> Self {
        Self { schema, events }
    }

    pub fn validate(&self, frame: Frame) -> Result<Validation, ValidationError> {
        if frame.is_empty() {
            self.events.log_message("No data to validate.");
            self.events.log_event(EventKind::ValidationSkipped, json!({ "reason": "empty_batch" }));
            return Ok(Validation::Empty);
        }

        if let Err(err) = self.check(&frame) {
            self.events.log_message(format!("Validation failed: {}", err));
            self.events.log_event(
                EventKind::ValidationFailed,
                json!({
                    "reason": err.reason(),
                    "columns": err.columns(),
                    "message": err.to_string(),
                }),
            );
            return Err(err);
        }

        self.events.log_message("Schema validation passed.");
        self.events.log_event(
            EventKind::ValidationPassed,
            json!({ "rows_validated": frame.num_rows() }),
        );
        Ok(Validation::Passed(ValidatedBatch(frame)))
    }

    fn check(&self, frame: &Frame) -> Result<(), ValidationError> {
        let required = self.schema.required_columns();

        let mut missing: Vec<String> = required
            .iter()
            .filter(|name| frame.column(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(ValidationError::MissingColumns(missing));
        }

        let with_nulls: Vec<String> = required
            .iter()
            .filter(|name| {
                frame
                    .column(name)
                    .map(|c| c.values.iter().any(Value::is_null))
                    .unwrap_or(false)
            })
            .map(|name| name.to_string())
            .collect();
        if !with_nulls.is_empty() {
            return Err(ValidationError::NullValues { columns: with_nulls });
        }

        for (name, kind) in self.schema.dtypes() {
            let Some(column) = frame.column(name) else {
                continue;
            };
            let conforms = column
                .values
                .iter()
                .filter(|v| !v.is_null())
                .all(|v| value_conforms(v, *kind));
            if !conforms {
                return Err(ValidationError::TypeMismatch {
                    column: name.clone(),
                    expected: kind.to_string(),
                });
            }
        }

        for (name, constraint) in self.schema.constraints() {
            let (Some(min), Some(column)) = (constraint.min, frame.column(name)) else {
                continue;
            };
            for value in column.values.iter().filter(|v| !v.is_null()) {
                let number = constraint_number(value).ok_or_else(|| ValidationError::TypeMismatch {
                    column: name.clone(),
                    expected: "numeric".to_string(),
                })?;
                if number < min {
                    return Err(ValidationError::ConstraintViolation {
                        column: name.clone(),
                        min,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Numeric view for constraint checks; booleans compare as 0/1
fn constraint_number(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        other => other.as_f64(),
    }
}

/// Whether `value` is a valid representation of `kind`
fn value_conforms(value: &Value, kind: ColumnKind) -> bool {
    match kind {
        ColumnKind::Int => matches!(value, Value::Int(_)),
        ColumnKind::Float => matches!(value, Value::Int(_) | Value::Float(_)),
        // SQLite stores booleans as 0/1 integers
        ColumnKind::Boolean => value.as_flag().is_some(),
        ColumnKind::String => matches!(value, Value::Text(_)),
    }
}
