//! Batch extractor: cursor-based micro-batch reads
//!
//! An [`ExtractionUnit`] is one SQLite transaction that wraps the cursor
//! read, the row fetch and the cursor advance. Nothing is durable until
//! [`ExtractionUnit::commit`]; dropping or rolling back the unit leaves the
//! cursor where it was, so the next run re-reads the same rows.
//!
//! The cursor jumps to the largest identifier in the batch. That tolerates
//! gaps (deleted rows, non-contiguous keys) and still processes every row
//! exactly once, provided the upstream writer assigns identifiers in
//! non-decreasing insertion order and never reuses them. That precondition
//! is not checked here.

use crate::cursor::CursorStore;
use serde_json::json;
use spendcast_common::config::SourceConfig;
use spendcast_common::{Column, Error, EventKind, EventLogger, Frame, Result, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column as _, Row, Sqlite, SqlitePool, Transaction, TypeInfo, ValueRef};
use tracing::debug;

/// Rows pulled in one extraction, bookkeeping columns removed
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    frame: Frame,
    previous_cursor: i64,
    new_cursor: i64,
}

impl Batch {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    pub fn num_rows(&self) -> usize {
        self.frame.num_rows()
    }

    pub fn previous_cursor(&self) -> i64 {
        self.previous_cursor
    }

    pub fn new_cursor(&self) -> i64 {
        self.new_cursor
    }
}

pub struct BatchExtractor {
    pool: SqlitePool,
    source: SourceConfig,
    events: EventLogger,
}

impl BatchExtractor {
    pub fn new(pool: SqlitePool, source: SourceConfig, events: EventLogger) -> Result<Self> {
        source.validate()?;
        Ok(Self { pool, source, events })
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    /// Open a unit of work
    pub async fn begin(&self) -> Result<ExtractionUnit<'_>> {
        let tx = self.pool.begin().await?;
        Ok(ExtractionUnit {
            tx,
            extractor: self,
        })
    }

    /// Pull one batch and commit the cursor advance immediately
    pub async fn pull(&self) -> Result<Option<Batch>> {
        let mut unit = self.begin().await?;
        let batch = unit.pull().await?;
        unit.commit().await?;
        Ok(batch)
    }
}

/// One transaction spanning cursor read, fetch and cursor advance
pub struct ExtractionUnit<'a> {
    tx: Transaction<'static, Sqlite>,
    extractor: &'a BatchExtractor,
}

impl ExtractionUnit<'_> {
    /// Fetch the next batch after the cursor and stage the cursor advance.
    ///
    /// Returns `None` (and leaves the cursor alone) when no new rows exist.
    pub async fn pull(&mut self) -> Result<Option<Batch>> {
        let source = &self.extractor.source;
        let events = &self.extractor.events;

        let last_id = CursorStore::get(&mut self.tx).await?;

        let sql = format!(
            "SELECT * FROM {table} WHERE {id} > ? ORDER BY {id} LIMIT ?",
            table = source.table,
            id = source.id_column
        );
        let rows = sqlx::query(&sql)
            .bind(last_id)
            .bind(source.batch_size)
            .fetch_all(&mut *self.tx)
            .await?;

        if rows.is_empty() {
            events.log_message(format!("No new data found in {}.", source.table));
            events.log_event(EventKind::NoData, json!({ "last_id": last_id }));
            return Ok(None);
        }

        let mut frame = rows_to_frame(&rows)?;
        let new_last_id = max_identifier(&frame, &source.id_column)?;
        CursorStore::advance(&mut self.tx, new_last_id).await?;

        events.log_message(format!("Ingested {} rows from {}.", frame.num_rows(), source.table));
        events.log_event(
            EventKind::DataIngested,
            json!({
                "rows": frame.num_rows(),
                "previous_last_id": last_id,
                "new_last_id": new_last_id,
            }),
        );

        frame.drop_columns(&[source.id_column.as_str(), source.timestamp_column.as_str()]);

        Ok(Some(Batch {
            frame,
            previous_cursor: last_id,
            new_cursor: new_last_id,
        }))
    }

    /// Cursor value as seen inside this unit
    pub async fn cursor(&mut self) -> Result<i64> {
        CursorStore::get(&mut self.tx).await
    }

    /// Make the staged cursor advance durable
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        debug!("Extraction unit committed");
        Ok(())
    }

    /// Discard the staged cursor advance
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        debug!("Extraction unit rolled back");
        Ok(())
    }
}

/// Largest identifier in the batch
fn max_identifier(frame: &Frame, id_column: &str) -> Result<i64> {
    let column = frame
        .column(id_column)
        .ok_or_else(|| Error::Config(format!("source table has no {} column", id_column)))?;

    column
        .values
        .iter()
        .map(|value| match value {
            Value::Int(id) => Ok(*id),
            other => Err(Error::InvalidInput(format!(
                "identifier column {} holds a non-integer value {:?}",
                id_column,
                other.to_text()
            ))),
        })
        .try_fold(i64::MIN, |max, id| id.map(|id| max.max(id)))
}

/// Decode rows by SQLite storage class into a frame
fn rows_to_frame(rows: &[SqliteRow]) -> Result<Frame> {
    let names: Vec<String> = match rows.first() {
        Some(first) => first.columns().iter().map(|c| c.name().to_string()).collect(),
        None => return Ok(Frame::new()),
    };

    let mut columns: Vec<Column> = names
        .iter()
        .map(|name| Column::new(name.clone(), Vec::with_capacity(rows.len())))
        .collect();

    for row in rows {
        for (index, column) in columns.iter_mut().enumerate() {
            column.values.push(decode_value(row, index)?);
        }
    }

    Frame::from_columns(columns)
}

fn decode_value(row: &SqliteRow, index: usize) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let storage = raw.type_info().name().to_string();
    let value = match storage.as_str() {
        "INTEGER" => Value::Int(row.try_get::<i64, _>(index)?),
        "REAL" => Value::Float(row.try_get::<f64, _>(index)?),
        "TEXT" => Value::Text(row.try_get::<String, _>(index)?),
        "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(index)?),
        other => {
            return Err(Error::InvalidInput(format!(
                "column {} has unsupported storage class {}",
                row.columns()[index].name(),
                other
            )))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spendcast_common::db::init_database;

    async fn setup() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("extract.db")).await.unwrap();
        sqlx::query(
            "CREATE TABLE readings (id INTEGER PRIMARY KEY, created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP, \
             amount REAL, label TEXT, flag BOOLEAN)",
        )
        .execute(&pool)
        .await
        .unwrap();
        (dir, pool)
    }

    fn source(batch_size: i64) -> SourceConfig {
        SourceConfig {
            table: "readings".to_string(),
            batch_size,
            ..SourceConfig::default()
        }
    }

    #[tokio::test]
    async fn test_decodes_storage_classes_and_strips_bookkeeping() {
        let (_dir, pool) = setup().await;
        sqlx::query("INSERT INTO readings (id, amount, label, flag) VALUES (5, 2.5, 'a', 1), (9, NULL, 'b', 0)")
            .execute(&pool)
            .await
            .unwrap();

        let extractor = BatchExtractor::new(pool, source(10), EventLogger::new()).unwrap();
        let batch = extractor.pull().await.unwrap().unwrap();

        assert_eq!(batch.previous_cursor(), 0);
        assert_eq!(batch.new_cursor(), 9);
        assert_eq!(batch.frame().column_names(), vec!["amount", "label", "flag"]);
        assert_eq!(
            batch.frame().column("amount").unwrap().values,
            vec![Value::Float(2.5), Value::Null]
        );
        assert_eq!(batch.frame().column("flag").unwrap().values, vec![Value::Int(1), Value::Int(0)]);
    }

    #[tokio::test]
    async fn test_dropped_unit_leaves_cursor_unchanged() {
        let (_dir, pool) = setup().await;
        sqlx::query("INSERT INTO readings (id, amount) VALUES (1, 1.0), (2, 2.0)")
            .execute(&pool)
            .await
            .unwrap();
        let extractor = BatchExtractor::new(pool.clone(), source(10), EventLogger::new()).unwrap();

        {
            let mut unit = extractor.begin().await.unwrap();
            let batch = unit.pull().await.unwrap().unwrap();
            assert_eq!(batch.num_rows(), 2);
            unit.rollback().await.unwrap();
        }

        assert_eq!(CursorStore::peek(&pool).await.unwrap(), None);
        let again = extractor.pull().await.unwrap().unwrap();
        assert_eq!(again.num_rows(), 2);
        assert_eq!(CursorStore::peek(&pool).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_gaps_in_identifiers_are_tolerated() {
        let (_dir, pool) = setup().await;
        sqlx::query("INSERT INTO readings (id, amount) VALUES (3, 1.0), (10, 2.0), (11, 3.0), (40, 4.0)")
            .execute(&pool)
            .await
            .unwrap();
        let extractor = BatchExtractor::new(pool.clone(), source(3), EventLogger::new()).unwrap();

        let first = extractor.pull().await.unwrap().unwrap();
        assert_eq!(first.new_cursor(), 11);
        let second = extractor.pull().await.unwrap().unwrap();
        assert_eq!(second.num_rows(), 1);
        assert_eq!(second.new_cursor(), 40);
        assert!(extractor.pull().await.unwrap().is_none());
    }

    #[test]
    fn test_rejects_unsafe_source_names() {
        let source = SourceConfig {
            table: "readings; DROP TABLE x".to_string(),
            ..SourceConfig::default()
        };
        assert!(source.validate().is_err());
    }
}
