//! Feature transformation
//!
//! Turns a validated batch into a model-ready feature matrix and target
//! vector. Numerical features are coerced softly: values that do not parse
//! as numbers become missing and are counted, never rejected.

use crate::validate::ValidatedBatch;
use serde_json::json;
use spendcast_common::model::parse_flag;
use spendcast_common::{
    Error, EventKind, EventLogger, FeatureColumn, FeatureMatrix, FeatureValues, Result, SchemaContract,
    TargetVector, Value,
};

pub struct Transformer<'a> {
    schema: &'a SchemaContract,
    events: &'a EventLogger,
}

impl<'a> Transformer<'a> {
    pub fn new(schema: &'a SchemaContract, events: &'a EventLogger) -> Self {
        Self { schema, events }
    }

    pub fn transform(&self, batch: &ValidatedBatch) -> Result<(FeatureMatrix, TargetVector)> {
        let frame = batch.frame();
        if frame.is_empty() {
            self.events.log_message("No data to preprocess.");
            self.events.log_event(EventKind::PreprocessSkipped, json!({ "reason": "empty_batch" }));
            return Ok((FeatureMatrix::default(), Vec::new()));
        }

        let mut coerced_missing = 0usize;
        let mut columns = Vec::new();

        for name in self.schema.numerical_features() {
            let values: Vec<Option<f64>> = column_values(frame, name)?
                .iter()
                .map(|v| {
                    let number = v.coerce_f64();
                    if number.is_none() {
                        coerced_missing += 1;
                    }
                    number
                })
                .collect();
            columns.push(FeatureColumn {
                name: name.clone(),
                values: FeatureValues::Numeric(values),
            });
        }

        for name in self.schema.categorical_features() {
            let raw = column_values(frame, name)?;
            let values = if self.schema.is_flag(name) {
                FeatureValues::Flag(raw.iter().map(to_flag).collect())
            } else {
                FeatureValues::Categorical(raw.iter().map(Value::to_text).collect())
            };
            columns.push(FeatureColumn {
                name: name.clone(),
                values,
            });
        }

        let target = self.schema.target();
        let y = column_values(frame, target)?
            .iter()
            .enumerate()
            .map(|(row, v)| {
                v.coerce_f64().ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "target {} is not numeric at row {}: {:?}",
                        target,
                        row,
                        v.to_text()
                    ))
                })
            })
            .collect::<Result<TargetVector>>()?;

        let x = FeatureMatrix::new(columns)?;

        self.events.log_message("Preprocessing completed.");
        self.events.log_event(
            EventKind::PreprocessCompleted,
            json!({
                "rows": x.num_rows(),
                "features": x.column_names(),
                "coerced_missing": coerced_missing,
            }),
        );

        Ok((x, y))
    }
}

fn column_values<'f>(frame: &'f spendcast_common::Frame, name: &str) -> Result<&'f [Value]> {
    frame
        .column(name)
        .map(|c| c.values.as_slice())
        .ok_or_else(|| Error::Internal(format!("validated batch lacks column {}", name)))
}

/// Two-valued cast: real flags, then textual spellings, then truthiness
fn to_flag(value: &Value) -> bool {
    if let Some(flag) = value.as_flag() {
        return flag;
    }
    match value {
        Value::Text(text) => parse_flag(text).unwrap_or(!text.is_empty()),
        Value::Int(v) => *v != 0,
        Value::Float(v) => *v != 0.0,
        Value::Null => false,
        Value::Bool(b) => *b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{Validation, Validator};
    use spendcast_common::Frame;

    const SCHEMA: &str = r#"
numerical_features = ["quantity", "line_net_amount"]
categorical_features = ["loyalty_status", "discount_applied"]
target = "total_cost"

[dtypes]
quantity = "float"
line_net_amount = "float"
total_cost = "float"
discount_applied = "boolean"
"#;

    fn validated(schema: &SchemaContract, frame: Frame) -> ValidatedBatch {
        match Validator::new(schema, &EventLogger::new()).validate(frame).unwrap() {
            Validation::Passed(batch) => batch,
            Validation::Empty => panic!("unexpected empty batch"),
        }
    }

    fn batch() -> Frame {
        Frame::from_rows(
            &["quantity", "line_net_amount", "loyalty_status", "discount_applied", "total_cost", "extra"],
            vec![
                vec![
                    Value::Int(2),
                    Value::Float(19.5),
                    Value::Text("gold".into()),
                    Value::Int(1),
                    Value::Float(20.0),
                    Value::Text("ignored".into()),
                ],
                vec![
                    Value::Float(1.0),
                    Value::Float(5.25),
                    Value::Text("none".into()),
                    Value::Int(0),
                    Value::Int(6),
                    Value::Null,
                ],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_columns_follow_schema_order_and_kinds() {
        let schema = SchemaContract::from_toml_str(SCHEMA).unwrap();
        let events = EventLogger::new();
        let (x, y) = Transformer::new(&schema, &events)
            .transform(&validated(&schema, batch()))
            .unwrap();

        assert_eq!(
            x.column_names(),
            vec!["quantity", "line_net_amount", "loyalty_status", "discount_applied"]
        );
        assert_eq!(
            x.column("quantity").unwrap().values,
            FeatureValues::Numeric(vec![Some(2.0), Some(1.0)])
        );
        assert_eq!(
            x.column("loyalty_status").unwrap().values,
            FeatureValues::Categorical(vec!["gold".into(), "none".into()])
        );
        assert_eq!(
            x.column("discount_applied").unwrap().values,
            FeatureValues::Flag(vec![true, false])
        );
        assert_eq!(y, vec![20.0, 6.0]);
    }

    #[test]
    fn test_unparsable_numbers_become_missing() {
        let schema = SchemaContract::from_toml_str(
            r#"
numerical_features = ["quantity"]
target = "total_cost"
"#,
        )
        .unwrap();
        let sink = std::sync::Arc::new(spendcast_common::events::MemorySink::new());
        let events = EventLogger::new().with_sink(sink.clone());
        let frame = Frame::from_rows(
            &["quantity", "total_cost"],
            vec![
                vec![Value::Text("3".into()), Value::Float(1.0)],
                vec![Value::Text("n/a".into()), Value::Float(2.0)],
            ],
        )
        .unwrap();

        let (x, _) = Transformer::new(&schema, &events)
            .transform(&validated(&schema, frame))
            .unwrap();

        assert_eq!(
            x.column("quantity").unwrap().values,
            FeatureValues::Numeric(vec![Some(3.0), None])
        );
        let completed = sink.events().into_iter().last().unwrap();
        assert_eq!(completed.kind, EventKind::PreprocessCompleted);
        assert_eq!(completed.payload["coerced_missing"], 1);
    }

    #[test]
    fn test_non_numeric_target_is_rejected() {
        let schema = SchemaContract::from_toml_str(
            r#"
numerical_features = ["quantity"]
target = "total_cost"
"#,
        )
        .unwrap();
        let events = EventLogger::new();
        let frame = Frame::from_rows(
            &["quantity", "total_cost"],
            vec![vec![Value::Int(1), Value::Text("lots".into())]],
        )
        .unwrap();

        let result = Transformer::new(&schema, &events).transform(&validated(&schema, frame));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_transform_is_idempotent_on_its_output() {
        let schema = SchemaContract::from_toml_str(SCHEMA).unwrap();
        let events = EventLogger::new();
        let transformer = Transformer::new(&schema, &events);

        let (x, y) = transformer.transform(&validated(&schema, batch())).unwrap();
        let rendered = x.to_frame(&schema, &y).unwrap();
        let (x2, y2) = transformer.transform(&validated(&schema, rendered)).unwrap();

        assert_eq!(x, x2);
        assert_eq!(y, y2);
    }

    #[test]
    fn test_int_columns_survive_a_second_pass() {
        let schema = SchemaContract::from_toml_str(
            r#"
numerical_features = ["total_items"]
target = "total_cost"

[dtypes]
total_items = "int"
total_cost = "float"
"#,
        )
        .unwrap();
        let events = EventLogger::new();
        let transformer = Transformer::new(&schema, &events);
        let frame = Frame::from_rows(
            &["total_items", "total_cost"],
            vec![
                vec![Value::Int(3), Value::Float(12.0)],
                vec![Value::Int(4), Value::Float(16.5)],
            ],
        )
        .unwrap();

        let (x, y) = transformer.transform(&validated(&schema, frame)).unwrap();
        let rendered = x.to_frame(&schema, &y).unwrap();
        assert_eq!(
            rendered.column("total_items").unwrap().values,
            vec![Value::Int(3), Value::Int(4)]
        );

        let revalidated = Validator::new(&schema, &events).validate(rendered).unwrap();
        let Validation::Passed(batch) = revalidated else {
            panic!("expected the rendered batch to validate");
        };
        let (x2, y2) = transformer.transform(&batch).unwrap();
        assert_eq!(x, x2);
        assert_eq!(y, y2);
    }

    #[test]
    fn test_flag_cast_accepts_text_spellings() {
        assert!(to_flag(&Value::Text("True".into())));
        assert!(!to_flag(&Value::Text("no".into())));
        assert!(to_flag(&Value::Int(7)));
        assert!(!to_flag(&Value::Null));
    }
}
