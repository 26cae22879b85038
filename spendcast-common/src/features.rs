//! Model-ready feature matrix and target vector

use crate::frame::{Column, Frame, Value};
use crate::schema::{ColumnKind, SchemaContract};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Target vector, aligned row-for-row with a [`FeatureMatrix`]
pub type TargetVector = Vec<f64>;

/// Normalized values of one feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureValues {
    /// `None` marks a value that could not be coerced to a number
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<String>),
    Flag(Vec<bool>),
}

impl FeatureValues {
    pub fn len(&self) -> usize {
        match self {
            FeatureValues::Numeric(v) => v.len(),
            FeatureValues::Categorical(v) => v.len(),
            FeatureValues::Flag(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, rows: &[usize]) -> FeatureValues {
        match self {
            FeatureValues::Numeric(v) => FeatureValues::Numeric(rows.iter().map(|&i| v[i]).collect()),
            FeatureValues::Categorical(v) => {
                FeatureValues::Categorical(rows.iter().map(|&i| v[i].clone()).collect())
            }
            FeatureValues::Flag(v) => FeatureValues::Flag(rows.iter().map(|&i| v[i]).collect()),
        }
    }

    /// Frame values in the representation `kind` declares
    fn to_values(&self, kind: Option<ColumnKind>) -> Vec<Value> {
        match self {
            FeatureValues::Numeric(v) => v
                .iter()
                .map(|x| x.map(|n| render_number(n, kind)).unwrap_or(Value::Null))
                .collect(),
            FeatureValues::Categorical(v) => v.iter().map(|text| render_text(text, kind)).collect(),
            FeatureValues::Flag(v) => v.iter().copied().map(Value::Bool).collect(),
        }
    }
}

fn render_number(value: f64, kind: Option<ColumnKind>) -> Value {
    let integral = value.fract() == 0.0 && value.abs() < i64::MAX as f64;
    if kind == Some(ColumnKind::Int) && integral {
        Value::Int(value as i64)
    } else {
        Value::Float(value)
    }
}

fn render_text(text: &str, kind: Option<ColumnKind>) -> Value {
    let parsed = match kind {
        Some(ColumnKind::Int) => text.parse::<i64>().ok().map(Value::Int),
        Some(ColumnKind::Float) => text.parse::<f64>().ok().map(Value::Float),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::Text(text.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub values: FeatureValues,
}

/// Feature columns in schema order, all of the same length
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    columns: Vec<FeatureColumn>,
    rows: usize,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<FeatureColumn>) -> Result<Self> {
        let rows = columns.first().map(|c| c.values.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.values.len() != rows) {
            return Err(Error::InvalidInput(format!(
                "feature {} has {} rows, expected {}",
                bad.name,
                bad.values.len(),
                rows
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Row subset, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            columns: self
                .columns
                .iter()
                .map(|c| FeatureColumn {
                    name: c.name.clone(),
                    values: c.values.select(rows),
                })
                .collect(),
            rows: rows.len(),
        }
    }

    /// Render features plus target back into a frame that conforms to `schema`
    pub fn to_frame(&self, schema: &SchemaContract, y: &[f64]) -> Result<Frame> {
        if y.len() != self.rows {
            return Err(Error::InvalidInput(format!(
                "target has {} rows, features have {}",
                y.len(),
                self.rows
            )));
        }
        let mut columns: Vec<Column> = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.values.to_values(schema.dtype(&c.name))))
            .collect();
        let target = schema.target();
        let target_kind = schema.dtype(target);
        columns.push(Column::new(
            target,
            y.iter().map(|v| render_number(*v, target_kind)).collect(),
        ));
        Frame::from_columns(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> FeatureMatrix {
        FeatureMatrix::new(vec![
            FeatureColumn {
                name: "quantity".into(),
                values: FeatureValues::Numeric(vec![Some(1.0), None, Some(3.0)]),
            },
            FeatureColumn {
                name: "discount_applied".into(),
                values: FeatureValues::Flag(vec![true, false, true]),
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_select_rows_keeps_alignment() {
        let subset = matrix().select_rows(&[2, 0]);
        assert_eq!(subset.num_rows(), 2);
        assert_eq!(
            subset.column("quantity").unwrap().values,
            FeatureValues::Numeric(vec![Some(3.0), Some(1.0)])
        );
    }

    fn schema(dtypes: &str) -> SchemaContract {
        SchemaContract::from_toml_str(&format!(
            "numerical_features = [\"quantity\"]\ncategorical_features = [\"discount_applied\"]\ntarget = \"total_cost\"\n[dtypes]\n{}",
            dtypes
        ))
        .unwrap()
    }

    #[test]
    fn test_to_frame_renders_missing_as_null() {
        let frame = matrix().to_frame(&schema(""), &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(frame.column_names(), vec!["quantity", "discount_applied", "total_cost"]);
        assert_eq!(frame.column("quantity").unwrap().values[1], Value::Null);
        assert_eq!(frame.column("discount_applied").unwrap().values[0], Value::Bool(true));
    }

    #[test]
    fn test_to_frame_rejects_misaligned_target() {
        assert!(matrix().to_frame(&schema(""), &[1.0]).is_err());
    }

    #[test]
    fn test_to_frame_keeps_declared_int_columns_integral() {
        let schema = schema("quantity = \"int\"\ntotal_cost = \"int\"\n");
        let frame = matrix().to_frame(&schema, &[4.0, 5.5, 6.0]).unwrap();

        assert_eq!(
            frame.column("quantity").unwrap().values,
            vec![Value::Int(1), Value::Null, Value::Int(3)]
        );
        // A fractional value cannot be an int; it stays a float
        assert_eq!(
            frame.column("total_cost").unwrap().values,
            vec![Value::Int(4), Value::Float(5.5), Value::Int(6)]
        );
    }

    #[test]
    fn test_categorical_text_is_rendered_in_declared_kind() {
        assert_eq!(render_text("3", Some(ColumnKind::Int)), Value::Int(3));
        assert_eq!(render_text("gold", Some(ColumnKind::Int)), Value::Text("gold".into()));
        assert_eq!(render_text("3", None), Value::Text("3".into()));
    }

    #[test]
    fn test_rejects_ragged_columns() {
        let result = FeatureMatrix::new(vec![
            FeatureColumn {
                name: "a".into(),
                values: FeatureValues::Flag(vec![true]),
            },
            FeatureColumn {
                name: "b".into(),
                values: FeatureValues::Flag(vec![]),
            },
        ]);
        assert!(result.is_err());
    }
}
