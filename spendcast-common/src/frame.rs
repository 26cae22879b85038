//! Column-oriented tabular data passed between pipeline stages

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell, tagged by its storage representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of integral and floating values only
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Lenient numeric conversion: also accepts booleans and numeric text
    pub fn coerce_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) if v.is_finite() => Some(*v),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    /// Two-valued view: booleans, and integers restricted to 0/1
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            _ => None,
        }
    }

    /// Text rendering used for categorical casts
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => "None".to_string(),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Named column of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Ordered set of equally long, uniquely named columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<Column>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from columns; all columns must have the same length and distinct names
    pub fn from_columns(columns: Vec<Column>) -> crate::Result<Self> {
        let mut frame = Frame::new();
        for column in columns {
            frame.push_column(column)?;
        }
        Ok(frame)
    }

    /// Build from row-major data sharing one header
    pub fn from_rows(names: &[&str], rows: Vec<Vec<Value>>) -> crate::Result<Self> {
        let mut columns: Vec<Column> = names.iter().map(|n| Column::new(*n, Vec::new())).collect();
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != names.len() {
                return Err(crate::Error::InvalidInput(format!(
                    "row {} has {} values, expected {}",
                    index,
                    row.len(),
                    names.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }
        Self::from_columns(columns)
    }

    pub fn push_column(&mut self, column: Column) -> crate::Result<()> {
        if self.column(&column.name).is_some() {
            return Err(crate::Error::InvalidInput(format!(
                "duplicate column: {}",
                column.name
            )));
        }
        if let Some(first) = self.columns.first() {
            if first.values.len() != column.values.len() {
                return Err(crate::Error::InvalidInput(format!(
                    "column {} has {} rows, expected {}",
                    column.name,
                    column.values.len(),
                    first.values.len()
                )));
            }
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Remove the named columns if present
    pub fn drop_columns(&mut self, names: &[&str]) {
        self.columns.retain(|c| !names.contains(&c.name.as_str()));
    }

    /// Values of one row, in column order
    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        if index >= self.num_rows() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[index]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_builds_columns() {
        let frame = Frame::from_rows(
            &["quantity", "loyalty_status"],
            vec![
                vec![Value::Int(2), Value::Text("gold".into())],
                vec![Value::Int(5), Value::Text("silver".into())],
            ],
        )
        .unwrap();

        assert_eq!(frame.num_rows(), 2);
        assert_eq!(frame.column_names(), vec!["quantity", "loyalty_status"]);
        assert_eq!(frame.column("quantity").unwrap().values[1], Value::Int(5));
        assert_eq!(frame.row(0).unwrap()[1], &Value::Text("gold".into()));
    }

    #[test]
    fn test_rejects_ragged_and_duplicate_columns() {
        let ragged = Frame::from_columns(vec![
            Column::new("a", vec![Value::Int(1)]),
            Column::new("b", vec![]),
        ]);
        assert!(ragged.is_err());

        let duplicate = Frame::from_columns(vec![
            Column::new("a", vec![Value::Int(1)]),
            Column::new("a", vec![Value::Int(2)]),
        ]);
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_drop_columns_ignores_absent_names() {
        let mut frame = Frame::from_rows(&["id", "x"], vec![vec![Value::Int(1), Value::Float(0.5)]]).unwrap();
        frame.drop_columns(&["id", "created_at"]);
        assert_eq!(frame.column_names(), vec!["x"]);
    }

    #[test]
    fn test_coercions() {
        assert_eq!(Value::Text(" 2.5 ".into()).coerce_f64(), Some(2.5));
        assert_eq!(Value::Text("abc".into()).coerce_f64(), None);
        assert_eq!(Value::Bool(true).coerce_f64(), Some(1.0));
        assert_eq!(Value::Int(1).as_flag(), Some(true));
        assert_eq!(Value::Int(2).as_flag(), None);
        assert_eq!(Value::Float(3.0).as_f64(), Some(3.0));
        assert_eq!(Value::Text("3".into()).as_f64(), None);
    }
}
