//! Model training
//!
//! Splits the batch into train and test rows with a seeded shuffle, fits the
//! ridge regression on the train rows and scores it on the held-out rows.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::json;
use spendcast_common::{
    Error, EventKind, EventLogger, FeatureMatrix, ModelMetrics, RegressionModel, Result,
};
use std::path::Path;

/// Training parameters (`training.toml`)
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TrainingConfig {
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SplitConfig {
    /// Fraction of rows held out for evaluation
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            random_state: default_random_state(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Ridge penalty
    #[serde(default = "default_l2")]
    pub l2: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { l2: default_l2() }
    }
}

fn default_test_size() -> f64 {
    0.2
}

fn default_random_state() -> u64 {
    42
}

fn default_l2() -> f64 {
    1e-6
}

impl TrainingConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read training config {} failed: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TrainingConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse training config failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.split.test_size) {
            return Err(Error::Config(format!(
                "split.test_size must be in [0, 1), got {}",
                self.split.test_size
            )));
        }
        if !self.model.l2.is_finite() || self.model.l2 < 0.0 {
            return Err(Error::Config(format!(
                "model.l2 must be a non-negative number, got {}",
                self.model.l2
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    /// Nothing to train on
    Skipped,
    Trained(RegressionModel),
}

pub struct Trainer<'a> {
    config: &'a TrainingConfig,
    events: &'a EventLogger,
}

impl<'a> Trainer<'a> {
    pub fn new(config: &'a TrainingConfig, events: &'a EventLogger) -> Self {
        Self { config, events }
    }

    pub fn train(&self, x: &FeatureMatrix, y: &[f64], target: &str) -> Result<TrainOutcome> {
        if x.is_empty() {
            self.events.log_message("No data to train on.");
            self.events.log_event(EventKind::TrainingSkipped, json!({ "reason": "empty_dataset" }));
            return Ok(TrainOutcome::Skipped);
        }

        let (train_rows, test_rows) = split_rows(x.num_rows(), &self.config.split);
        let x_train = x.select_rows(&train_rows);
        let y_train: Vec<f64> = train_rows.iter().map(|&i| y[i]).collect();

        let model = RegressionModel::fit(&x_train, &y_train, target, self.config.model.l2)?;

        // Score on the training rows when nothing was held out
        let (x_eval, y_eval) = if test_rows.is_empty() {
            (x_train, y_train)
        } else {
            (
                x.select_rows(&test_rows),
                test_rows.iter().map(|&i| y[i]).collect(),
            )
        };
        let predicted = model.predict(&x_eval)?;
        let (mae, rmse, r2) = ModelMetrics::score(&y_eval, &predicted);
        let metrics = ModelMetrics {
            train_size: train_rows.len(),
            test_size: test_rows.len(),
            mae,
            rmse,
            r2,
        };

        self.events.log_message(format!(
            "Model trained on {} rows (MAE {:.4}, RMSE {:.4}, R2 {:.4}).",
            metrics.train_size, mae, rmse, r2
        ));
        self.events.log_event(
            EventKind::TrainingCompleted,
            json!({
                "train_size": metrics.train_size,
                "test_size": metrics.test_size,
                "mae": mae,
                "rmse": rmse,
                "r2": r2,
            }),
        );

        Ok(TrainOutcome::Trained(model.with_metrics(metrics)))
    }
}

/// Seeded shuffle split; always leaves at least one training row
fn split_rows(n: usize, split: &SplitConfig) -> (Vec<usize>, Vec<usize>) {
    let mut rows: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(split.random_state);
    rows.shuffle(&mut rng);

    let n_test = ((n as f64) * split.test_size).ceil() as usize;
    let n_test = n_test.min(n.saturating_sub(1));
    let train = rows.split_off(n_test);
    (train, rows)
}
