//! Regression model artifact
//!
//! A ridge-regularized linear model over encoded features. Numeric features
//! are standardized with training statistics (missing values land on the
//! training mean), categorical features are one-hot encoded against the
//! categories seen in training, and flags encode as 0/1.
//!
//! The whole artifact (encoders, coefficients, metrics) serializes to JSON
//! and is immutable once written by the registry.

use crate::features::{FeatureColumn, FeatureMatrix, FeatureValues};
use crate::frame::Value;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use linfa_linalg::cholesky::SolveC;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Artifact layout version; bumped on incompatible changes
pub const ARTIFACT_FORMAT: u32 = 1;

const VARIANCE_EPSILON: f64 = 1e-12;

/// How one input feature maps onto design-matrix columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureEncoder {
    Numeric { name: String, mean: f64, scale: f64 },
    OneHot { name: String, categories: Vec<String> },
    Flag { name: String },
}

impl FeatureEncoder {
    pub fn name(&self) -> &str {
        match self {
            FeatureEncoder::Numeric { name, .. } => name,
            FeatureEncoder::OneHot { name, .. } => name,
            FeatureEncoder::Flag { name } => name,
        }
    }

    fn width(&self) -> usize {
        match self {
            FeatureEncoder::OneHot { categories, .. } => categories.len(),
            _ => 1,
        }
    }

    fn fit(column: &FeatureColumn) -> Self {
        let name = column.name.clone();
        match &column.values {
            FeatureValues::Numeric(values) => {
                let present: Vec<f64> = values.iter().flatten().copied().collect();
                let mean = if present.is_empty() {
                    0.0
                } else {
                    present.iter().sum::<f64>() / present.len() as f64
                };
                let variance = if present.is_empty() {
                    0.0
                } else {
                    present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / present.len() as f64
                };
                let std = variance.sqrt();
                let scale = if std.is_finite() && std > VARIANCE_EPSILON { std } else { 1.0 };
                FeatureEncoder::Numeric { name, mean, scale }
            }
            FeatureValues::Categorical(values) => {
                let categories: BTreeSet<&String> = values.iter().collect();
                FeatureEncoder::OneHot {
                    name,
                    categories: categories.into_iter().cloned().collect(),
                }
            }
            FeatureValues::Flag(_) => FeatureEncoder::Flag { name },
        }
    }

    /// Append the encoding of `row` to `out`
    fn encode_into(&self, column: &FeatureColumn, row: usize, out: &mut Vec<f64>) -> Result<()> {
        match (self, &column.values) {
            (FeatureEncoder::Numeric { mean, scale, .. }, FeatureValues::Numeric(values)) => {
                let value = values[row].unwrap_or(*mean);
                out.push((value - mean) / scale);
            }
            (FeatureEncoder::OneHot { categories, .. }, FeatureValues::Categorical(values)) => {
                let value = &values[row];
                out.extend(categories.iter().map(|c| if c == value { 1.0 } else { 0.0 }));
            }
            (FeatureEncoder::Flag { .. }, FeatureValues::Flag(values)) => {
                out.push(if values[row] { 1.0 } else { 0.0 });
            }
            _ => {
                return Err(Error::Model(format!(
                    "feature {} does not match the kind the model was trained with",
                    self.name()
                )))
            }
        }
        Ok(())
    }

    /// Convert one raw input value into a single-row feature column
    fn column_from_input(&self, value: &Value) -> Result<FeatureColumn> {
        let name = self.name().to_string();
        let values = match self {
            FeatureEncoder::Numeric { .. } => {
                let number = value.coerce_f64().ok_or_else(|| {
                    Error::InvalidInput(format!("{} must be numeric, got {:?}", name, value.to_text()))
                })?;
                FeatureValues::Numeric(vec![Some(number)])
            }
            FeatureEncoder::OneHot { .. } => FeatureValues::Categorical(vec![value.to_text()]),
            FeatureEncoder::Flag { .. } => {
                let flag = value
                    .as_flag()
                    .or_else(|| match value {
                        Value::Text(s) => parse_flag(s),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        Error::InvalidInput(format!("{} must be true or false, got {:?}", name, value.to_text()))
                    })?;
                FeatureValues::Flag(vec![flag])
            }
        };
        Ok(FeatureColumn { name, values })
    }
}

/// Parse common spellings of a boolean form field
pub fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Hold-out evaluation recorded with the artifact
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub train_size: usize,
    pub test_size: usize,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl ModelMetrics {
    /// Mean absolute error, root mean squared error and R² of `predicted` vs `actual`
    pub fn score(actual: &[f64], predicted: &[f64]) -> (f64, f64, f64) {
        let n = actual.len().min(predicted.len());
        if n == 0 {
            return (0.0, 0.0, 0.0);
        }
        let mean = actual[..n].iter().sum::<f64>() / n as f64;
        let mut abs = 0.0;
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (a, p) in actual.iter().zip(predicted) {
            abs += (a - p).abs();
            ss_res += (a - p).powi(2);
            ss_tot += (a - mean).powi(2);
        }
        let r2 = if ss_tot > VARIANCE_EPSILON {
            1.0 - ss_res / ss_tot
        } else if ss_res <= VARIANCE_EPSILON {
            1.0
        } else {
            0.0
        };
        (abs / n as f64, (ss_res / n as f64).sqrt(), r2)
    }
}

/// Trained, serializable regression model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionModel {
    pub format: u32,
    pub target: String,
    pub encoders: Vec<FeatureEncoder>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub l2: f64,
    pub trained_at: DateTime<Utc>,
    #[serde(default)]
    pub metrics: Option<ModelMetrics>,
}

impl RegressionModel {
    /// Fit by solving the ridge normal equations.
    ///
    /// `l2` is a per-sample penalty on every coefficient except the intercept.
    pub fn fit(x: &FeatureMatrix, y: &[f64], target: &str, l2: f64) -> Result<Self> {
        if x.num_rows() != y.len() {
            return Err(Error::Model(format!(
                "feature rows ({}) and target rows ({}) differ",
                x.num_rows(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(Error::Model("cannot fit on an empty dataset".to_string()));
        }
        if !l2.is_finite() || l2 < 0.0 {
            return Err(Error::Model(format!("l2 penalty must be >= 0, got {}", l2)));
        }
        if let Some(bad) = y.iter().find(|v| !v.is_finite()) {
            return Err(Error::Model(format!("target contains non-finite value {}", bad)));
        }

        let encoders: Vec<FeatureEncoder> = x.columns().iter().map(FeatureEncoder::fit).collect();
        let design = design_matrix(&encoders, x, true)?;
        let width = design.ncols();

        let mut gram = design.t().dot(&design);
        let moment = design.t().dot(&Array1::from(y.to_vec())).insert_axis(Axis(1));

        let penalty = l2 * y.len() as f64;
        for i in 1..width {
            gram[[i, i]] += penalty;
        }

        let beta = gram.solvec(&moment).map_err(|e| {
            Error::Model(format!("ridge normal equations have no solution ({}); increase model.l2", e))
        })?;
        let beta = beta.column(0);

        Ok(Self {
            format: ARTIFACT_FORMAT,
            target: target.to_string(),
            encoders,
            intercept: beta[0],
            coefficients: beta.iter().skip(1).copied().collect(),
            l2,
            trained_at: Utc::now(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: ModelMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Input feature names, in training order
    pub fn feature_names(&self) -> Vec<&str> {
        self.encoders.iter().map(FeatureEncoder::name).collect()
    }

    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        let design = design_matrix(&self.encoders, x, false)?;
        if design.ncols() != self.coefficients.len() {
            return Err(Error::Model(format!(
                "encoded width {} does not match {} coefficients",
                design.ncols(),
                self.coefficients.len()
            )));
        }
        let coefficients = ArrayView1::from(self.coefficients.as_slice());
        Ok(design.dot(&coefficients).mapv(|v| v + self.intercept).to_vec())
    }

    /// Predict a single observation given raw values keyed by feature name
    pub fn predict_one(&self, inputs: &BTreeMap<String, Value>) -> Result<f64> {
        let columns = self
            .encoders
            .iter()
            .map(|encoder| {
                let value = inputs.get(encoder.name()).ok_or_else(|| {
                    Error::InvalidInput(format!("missing field {}", encoder.name()))
                })?;
                encoder.column_from_input(value)
            })
            .collect::<Result<Vec<_>>>()?;
        let matrix = FeatureMatrix::new(columns)?;

        self.predict(&matrix)?
            .first()
            .copied()
            .ok_or_else(|| Error::Internal("prediction produced no output".to_string()))
    }

    /// Reject artifacts this build cannot interpret
    pub fn check_compatible(&self) -> Result<()> {
        if self.format != ARTIFACT_FORMAT {
            return Err(Error::Model(format!(
                "artifact format {} is not supported (expected {})",
                self.format, ARTIFACT_FORMAT
            )));
        }
        let width: usize = self.encoders.iter().map(FeatureEncoder::width).sum();
        if width != self.coefficients.len() {
            return Err(Error::Model(format!(
                "artifact has {} coefficients for {} encoded columns",
                self.coefficients.len(),
                width
            )));
        }
        Ok(())
    }
}

/// Encoded rows of `x`, one design-matrix row per observation
fn design_matrix(encoders: &[FeatureEncoder], x: &FeatureMatrix, intercept: bool) -> Result<Array2<f64>> {
    let width = usize::from(intercept) + encoders.iter().map(FeatureEncoder::width).sum::<usize>();
    let mut data = Vec::with_capacity(x.num_rows() * width);
    for row in 0..x.num_rows() {
        if intercept {
            data.push(1.0);
        }
        for encoder in encoders {
            let column = x
                .column(encoder.name())
                .ok_or_else(|| Error::Model(format!("feature {} missing from input", encoder.name())))?;
            encoder.encode_into(column, row, &mut data)?;
        }
    }
    Array2::from_shape_vec((x.num_rows(), width), data)
        .map_err(|e| Error::Model(format!("encoded rows do not fill the design matrix: {}", e)))
}
