//! Database initialization
//!
//! Opens (creating if needed) the SQLite database and makes sure the
//! pipeline state table exists. The source table is normally owned by the
//! upstream writer; [`ensure_source_table`] can create it from the schema
//! contract for fresh installs and tests.

use crate::config::{is_valid_identifier, SourceConfig};
use crate::schema::{ColumnKind, SchemaContract};
use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Key/value table holding pipeline progress
pub const PIPELINE_STATE_TABLE: &str = "pipeline_state";

/// Busy timeout applied to every connection (ms)
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Open the database at `db_path`, creating file and tables as needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // WAL lets the serving side read while a pipeline run holds the write lock
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_pipeline_state_table(&pool).await?;

    Ok(pool)
}

async fn create_pipeline_state_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
        PIPELINE_STATE_TABLE
    ))
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the source table described by `schema` if it does not exist.
///
/// Columns are typed from the declared kinds (undeclared features default to
/// REAL for numerical and TEXT for categorical), and every `min` constraint
/// becomes a CHECK clause.
pub async fn ensure_source_table(
    pool: &SqlitePool,
    source: &SourceConfig,
    schema: &SchemaContract,
) -> Result<()> {
    source.validate()?;
    let sql = source_table_ddl(source, schema)?;
    sqlx::query(&sql).execute(pool).await?;
    info!("Source table {} is ready", source.table);
    Ok(())
}

/// CREATE TABLE statement for the source table
pub fn source_table_ddl(source: &SourceConfig, schema: &SchemaContract) -> Result<String> {
    let mut columns = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", source.id_column)];

    for name in schema.required_columns() {
        if !is_valid_identifier(name) {
            return Err(Error::Config(format!("Invalid column name in schema: {:?}", name)));
        }
        let is_numerical = schema.numerical_features().iter().any(|f| f == name) || name == schema.target();
        let sql_type = match schema.dtype(name) {
            Some(ColumnKind::Int) => "INTEGER",
            Some(ColumnKind::Float) => "REAL",
            Some(ColumnKind::Boolean) => "BOOLEAN",
            Some(ColumnKind::String) => "TEXT",
            None if is_numerical => "REAL",
            None => "TEXT",
        };
        let mut column = format!("{} {}", name, sql_type);
        if let Some(min) = schema.min_for(name) {
            column.push_str(&format!(" CHECK ({} >= {})", name, min));
        }
        columns.push(column);
    }

    columns.push(format!(
        "{} TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP",
        source.timestamp_column
    ));

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        source.table,
        columns.join(",\n    ")
    ))
}
