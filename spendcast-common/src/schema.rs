//! Schema contract shared by validation and transformation
//!
//! The contract is parsed from a TOML document into an immutable value and
//! passed explicitly to each stage. Pipeline runs re-read the document every
//! time, so edits apply to the next run without redeploying.
//!
//! ```toml
//! numerical_features = ["quantity", "line_net_amount"]
//! categorical_features = ["loyalty_status", "discount_applied"]
//! target = "total_cost"
//!
//! [dtypes]
//! quantity = "float"
//! discount_applied = "boolean"
//!
//! [constraints.quantity]
//! min = 0
//! ```

use crate::config::is_valid_identifier;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// Declared representation of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Int,
    #[serde(alias = "numeric", alias = "double")]
    Float,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "str", alias = "text")]
    String,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Int => "int",
            ColumnKind::Float => "float",
            ColumnKind::Boolean => "boolean",
            ColumnKind::String => "string",
        };
        f.write_str(name)
    }
}

/// Per-column constraint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(default)]
    pub min: Option<f64>,
}

/// On-disk document shape, before invariants are checked
#[derive(Debug, Deserialize)]
struct SchemaDocument {
    numerical_features: Vec<String>,
    #[serde(default)]
    categorical_features: Vec<String>,
    target: String,
    #[serde(default)]
    dtypes: BTreeMap<String, ColumnKind>,
    #[serde(default)]
    constraints: BTreeMap<String, Constraint>,
}

/// Immutable, validated schema contract
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaContract {
    numerical_features: Vec<String>,
    categorical_features: Vec<String>,
    target: String,
    dtypes: BTreeMap<String, ColumnKind>,
    constraints: BTreeMap<String, Constraint>,
}

impl SchemaContract {
    pub fn new(
        numerical_features: Vec<String>,
        categorical_features: Vec<String>,
        target: impl Into<String>,
        dtypes: BTreeMap<String, ColumnKind>,
        constraints: BTreeMap<String, Constraint>,
    ) -> Result<Self> {
        let contract = Self {
            numerical_features,
            categorical_features,
            target: target.into(),
            dtypes,
            constraints,
        };
        contract.check_invariants()?;
        Ok(contract)
    }

    /// Read and validate the schema document at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read schema {} failed: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let doc: SchemaDocument = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse schema failed: {}", e)))?;
        Self::new(
            doc.numerical_features,
            doc.categorical_features,
            doc.target,
            doc.dtypes,
            doc.constraints,
        )
    }

    fn check_invariants(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(Error::Config("schema target must not be empty".to_string()));
        }

        // Column names end up in generated SQL
        let declared = self
            .required_columns()
            .into_iter()
            .chain(self.dtypes.keys().map(String::as_str))
            .chain(self.constraints.keys().map(String::as_str));
        for name in declared {
            if !is_valid_identifier(name) {
                return Err(Error::Config(format!(
                    "column name {:?} must be a plain identifier (letters, digits, underscore)",
                    name
                )));
            }
        }

        let mut seen = HashSet::new();
        for name in self.features() {
            if !seen.insert(name) {
                return Err(Error::Config(format!(
                    "feature {} is declared more than once (numerical and categorical lists must be disjoint)",
                    name
                )));
            }
        }

        if seen.contains(self.target.as_str()) {
            return Err(Error::Config(format!(
                "target {} must not also be a feature",
                self.target
            )));
        }

        for (column, constraint) in &self.constraints {
            if let Some(min) = constraint.min {
                if !min.is_finite() {
                    return Err(Error::Config(format!(
                        "constraint min for {} must be finite",
                        column
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn numerical_features(&self) -> &[String] {
        &self.numerical_features
    }

    pub fn categorical_features(&self) -> &[String] {
        &self.categorical_features
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Feature names in schema order: numerical first, then categorical
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.numerical_features
            .iter()
            .chain(self.categorical_features.iter())
            .map(String::as_str)
    }

    /// Features plus target
    pub fn required_columns(&self) -> Vec<&str> {
        self.features().chain(std::iter::once(self.target.as_str())).collect()
    }

    pub fn dtypes(&self) -> &BTreeMap<String, ColumnKind> {
        &self.dtypes
    }

    pub fn dtype(&self, column: &str) -> Option<ColumnKind> {
        self.dtypes.get(column).copied()
    }

    pub fn constraints(&self) -> &BTreeMap<String, Constraint> {
        &self.constraints
    }

    pub fn min_for(&self, column: &str) -> Option<f64> {
        self.constraints.get(column).and_then(|c| c.min)
    }

    /// Categorical features declared `boolean` are carried as two-valued flags
    pub fn is_flag(&self, column: &str) -> bool {
        self.categorical_features.iter().any(|c| c == column)
            && self.dtype(column) == Some(ColumnKind::Boolean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
numerical_features = ["quantity", "line_net_amount", "total_items"]
categorical_features = ["loyalty_status", "payment_method", "discount_applied"]
target = "total_cost"

[dtypes]
quantity = "float"
line_net_amount = "numeric"
total_items = "int"
loyalty_status = "string"
payment_method = "str"
discount_applied = "boolean"
total_cost = "float"

[constraints.quantity]
min = 0

[constraints.total_cost]
min = 0.0
"#;

    #[test]
    fn test_parses_document() {
        let schema = SchemaContract::from_toml_str(SCHEMA).unwrap();

        assert_eq!(schema.target(), "total_cost");
        assert_eq!(
            schema.features().collect::<Vec<_>>(),
            vec![
                "quantity",
                "line_net_amount",
                "total_items",
                "loyalty_status",
                "payment_method",
                "discount_applied"
            ]
        );
        assert_eq!(schema.required_columns().len(), 7);
        assert_eq!(schema.dtype("line_net_amount"), Some(ColumnKind::Float));
        assert_eq!(schema.dtype("payment_method"), Some(ColumnKind::String));
        assert_eq!(schema.min_for("quantity"), Some(0.0));
        assert_eq!(schema.min_for("total_items"), None);
        assert!(schema.is_flag("discount_applied"));
        assert!(!schema.is_flag("loyalty_status"));
    }

    #[test]
    fn test_rejects_overlapping_feature_lists() {
        let doc = r#"
numerical_features = ["quantity"]
categorical_features = ["quantity"]
target = "total_cost"
"#;
        assert!(matches!(SchemaContract::from_toml_str(doc), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_target_as_feature() {
        let doc = r#"
numerical_features = ["quantity", "total_cost"]
target = "total_cost"
"#;
        assert!(matches!(SchemaContract::from_toml_str(doc), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_unsafe_column_names() {
        let feature = r#"
numerical_features = ["quantity; DROP TABLE x"]
target = "total_cost"
"#;
        assert!(matches!(SchemaContract::from_toml_str(feature), Err(Error::Config(_))));

        let constrained = r#"
numerical_features = ["quantity"]
target = "total_cost"

[constraints."total-cost"]
min = 0
"#;
        assert!(matches!(SchemaContract::from_toml_str(constrained), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_unknown_kind() {
        let doc = r#"
numerical_features = ["quantity"]
target = "total_cost"

[dtypes]
quantity = "decimal"
"#;
        assert!(SchemaContract::from_toml_str(doc).is_err());
    }
}
