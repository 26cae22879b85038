//! Common error types for Spendcast

use thiserror::Error;

/// Common result type for Spendcast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the pipeline and serving binaries
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model fitting, encoding or artifact integrity error
    #[error("Model error: {0}")]
    Model(String),

    /// Batch rejected by the schema contract
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reason a batch was rejected by the validator.
///
/// Every variant is fatal to the batch; nothing is repaired automatically.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Required columns absent from the batch (sorted)
    #[error("missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Null values found in required columns
    #[error("null values in required columns: {}", .columns.join(", "))]
    NullValues { columns: Vec<String> },

    /// Column representation does not match its declared kind
    #[error("column {column} is not of type {expected}")]
    TypeMismatch { column: String, expected: String },

    /// A value is below the declared minimum
    #[error("column {column} has values below minimum {min}")]
    ConstraintViolation { column: String, min: f64 },
}

impl ValidationError {
    /// Stable reason code carried by `VALIDATION_FAILED` events
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::MissingColumns(_) => "missing_columns",
            ValidationError::NullValues { .. } => "null_values",
            ValidationError::TypeMismatch { .. } => "type_mismatch",
            ValidationError::ConstraintViolation { .. } => "min_constraint",
        }
    }

    /// Offending column names
    pub fn columns(&self) -> Vec<String> {
        match self {
            ValidationError::MissingColumns(columns) => columns.clone(),
            ValidationError::NullValues { columns } => columns.clone(),
            ValidationError::TypeMismatch { column, .. } => vec![column.clone()],
            ValidationError::ConstraintViolation { column, .. } => vec![column.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_are_stable() {
        let err = ValidationError::ConstraintViolation {
            column: "quantity".to_string(),
            min: 0.0,
        };
        assert_eq!(err.reason(), "min_constraint");
        assert_eq!(err.columns(), vec!["quantity".to_string()]);
        assert_eq!(err.to_string(), "column quantity has values below minimum 0");

        let err = ValidationError::MissingColumns(vec!["a".into(), "b".into()]);
        assert_eq!(err.reason(), "missing_columns");
        assert_eq!(err.to_string(), "missing columns: a, b");
    }

    #[test]
    fn test_validation_error_converts_into_common_error() {
        let err: Error = ValidationError::NullValues {
            columns: vec!["total_cost".into()],
        }
        .into();
        assert!(matches!(err, Error::Validation(ValidationError::NullValues { .. })));
    }
}
