//! SQLite-backed checkpoint storage.
//!
//! One row per source in a `checkpoints` table, overwritten in place. The
//! schema is created on connect (idempotent), so no external migration step is
//! needed:
//!
//! - `checkpoints.source`       ← source name (primary key)
//! - `checkpoints.cursor_json`  ← serialized [`FrontierCursor`]
//! - `checkpoints.completed_at` ← RFC3339 completion time
//! - `checkpoints.updated_at`   ← RFC3339 write time

use std::sync::Arc;

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use super::{Checkpoint, CheckpointError, CheckpointStore, PersistedCheckpoint};
use crate::frontier::FrontierCursor;
use async_trait::async_trait;
use chrono::Utc;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    source        TEXT PRIMARY KEY,
    cursor_json   TEXT NOT NULL,
    completed_at  TEXT NOT NULL,
    updated_at    TEXT NOT NULL
)
"#;

/// Durable checkpoint store over a shared SQLite pool.
pub struct SqliteCheckpointStore {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointStore").finish()
    }
}

fn backend(context: &str, e: impl std::fmt::Display) -> CheckpointError {
    CheckpointError::Backend {
        message: format!("{context}: {e}"),
    }
}

impl SqliteCheckpointStore {
    /// Connect (or create) a SQLite database at `database_url` and ensure the
    /// checkpoint schema exists. Example URL: `sqlite://tideline.db?mode=rwc`.
    #[must_use = "store must be used to persist checkpoints"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, CheckpointError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| backend("connect", e))?;
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| backend("create schema", e))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    #[instrument(skip(self), err)]
    async fn load(&self, source: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let row: Option<SqliteRow> = sqlx::query(
            r#"SELECT cursor_json, completed_at FROM checkpoints WHERE source = ?1"#,
        )
        .bind(source)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| backend("select checkpoint", e))?;

        let Some(row) = row else { return Ok(None) };
        let cursor_json: String = row
            .try_get("cursor_json")
            .map_err(|e| backend("read cursor_json", e))?;
        let completed_at: String = row
            .try_get("completed_at")
            .map_err(|e| backend("read completed_at", e))?;

        let cursor: FrontierCursor = serde_json::from_str(&cursor_json)?;
        let checkpoint = Checkpoint::try_from(PersistedCheckpoint {
            cursor,
            completed_at,
        })?;
        Ok(Some(checkpoint))
    }

    #[instrument(skip(self, checkpoint), err)]
    async fn save(&self, source: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let persisted = PersistedCheckpoint::from(checkpoint);
        let cursor_json = serde_json::to_string(&persisted.cursor)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO checkpoints (source, cursor_json, completed_at, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(source)
        .bind(&cursor_json)
        .bind(&persisted.completed_at)
        .bind(Utc::now().to_rfc3339())
        .execute(&*self.pool)
        .await
        .map_err(|e| backend("upsert checkpoint", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn memory_store() -> SqliteCheckpointStore {
        SqliteCheckpointStore::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite")
    }

    #[tokio::test]
    async fn connect_creates_schema_idempotently() {
        let store = memory_store().await;
        sqlx::query(SCHEMA).execute(&*store.pool).await.unwrap();
        assert!(store.load("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = memory_store().await;
        let cp = Checkpoint::new(FrontierCursor::month(2020, 12), Utc::now());
        store.save("mailing-list", &cp).await.unwrap();

        let loaded = store.load("mailing-list").await.unwrap().unwrap();
        assert_eq!(loaded.cursor, cp.cursor);
    }

    #[tokio::test]
    async fn replace_keeps_one_row_per_source() {
        let store = memory_store().await;
        for offset in [0u64, 40, 80] {
            let cp = Checkpoint::new(FrontierCursor::offset(offset), Utc::now());
            store.save("forum", &cp).await.unwrap();
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM checkpoints")
            .fetch_one(&*store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let loaded = store.load("forum").await.unwrap().unwrap();
        assert_eq!(loaded.cursor, FrontierCursor::offset(80));
    }
}
