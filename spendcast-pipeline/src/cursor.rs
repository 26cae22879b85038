//! Cursor store: durable record of the last ingested row identifier
//!
//! Both operations run on the caller's connection, which is always the
//! extraction transaction, so reading rows and advancing the cursor commit
//! or roll back together. The store never opens a transaction of its own.

use spendcast_common::db::PIPELINE_STATE_TABLE;
use spendcast_common::{Error, Result};
use sqlx::{SqliteConnection, SqlitePool};

/// Key of the cursor row in `pipeline_state`
pub const CURSOR_KEY: &str = "last_processed_id";

pub struct CursorStore;

impl CursorStore {
    /// Current cursor value, creating it at 0 when unset.
    ///
    /// The initializing INSERT is the first statement, so the enclosing
    /// transaction takes the database write lock before any rows are read
    /// and a concurrent run blocks instead of claiming the same rows.
    pub async fn get(conn: &mut SqliteConnection) -> Result<i64> {
        sqlx::query(&format!(
            "INSERT INTO {} (key, value) VALUES (?, '0') ON CONFLICT(key) DO NOTHING",
            PIPELINE_STATE_TABLE
        ))
        .bind(CURSOR_KEY)
        .execute(&mut *conn)
        .await?;

        let value: String = sqlx::query_scalar(&format!(
            "SELECT value FROM {} WHERE key = ?",
            PIPELINE_STATE_TABLE
        ))
        .bind(CURSOR_KEY)
        .fetch_one(&mut *conn)
        .await?;

        parse_cursor(&value)
    }

    /// Move the cursor to `new_id`; the cursor never moves backwards
    pub async fn advance(conn: &mut SqliteConnection, new_id: i64) -> Result<()> {
        let current = Self::get(&mut *conn).await?;
        if new_id < current {
            return Err(Error::Internal(format!(
                "cursor cannot move backwards ({} -> {})",
                current, new_id
            )));
        }

        sqlx::query(&format!(
            "UPDATE {} SET value = ? WHERE key = ?",
            PIPELINE_STATE_TABLE
        ))
        .bind(new_id.to_string())
        .bind(CURSOR_KEY)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Read-only view for status reporting; `None` before the first run
    pub async fn peek(pool: &SqlitePool) -> Result<Option<i64>> {
        let value: Option<String> = sqlx::query_scalar(&format!(
            "SELECT value FROM {} WHERE key = ?",
            PIPELINE_STATE_TABLE
        ))
        .bind(CURSOR_KEY)
        .fetch_optional(pool)
        .await?;

        value.as_deref().map(parse_cursor).transpose()
    }
}

fn parse_cursor(value: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| Error::Internal(format!("corrupt cursor value in pipeline_state: {:?}", value)))
}
