//! SQLite-backed queue and cursor store.
//!
//! Production clients persist their unsent events and sync cursors in a
//! single local database file so both survive restarts. The two tables are
//! created lazily on open.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use retain_core::{EventId, LibraryId};
use retain_events::EventEnvelope;

use crate::cursor_store::{SyncCursor, SyncCursorStore};
use crate::queue::{EventQueue, QueueEntry, StorageError};

fn backend(err: impl core::fmt::Display) -> StorageError {
    StorageError::Backend(err.to_string())
}

/// Open (creating if needed) the client-side sync database.
pub async fn open_client_db(path: &Path) -> Result<SqlitePool, StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(backend)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(backend)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS event_queue (
            event_id        TEXT PRIMARY KEY,
            event           TEXT NOT NULL,
            queued_at       TEXT NOT NULL,
            attempts        INTEGER NOT NULL DEFAULT 0,
            last_attempt_at TEXT NULL,
            acknowledged    INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(&pool)
    .await
    .map_err(backend)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_cursors (
            library_id       TEXT PRIMARY KEY,
            last_received_at TEXT NOT NULL,
            last_event_id    TEXT NOT NULL,
            synced_at        TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    .map_err(backend)?;

    Ok(pool)
}

/// SQLite event queue. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct SqliteEventQueue {
    pool: SqlitePool,
}

impl SqliteEventQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: sqlx::sqlite::SqliteRow) -> Result<QueueEntry, StorageError> {
    let event_json: String = row.try_get("event").map_err(backend)?;
    let event: EventEnvelope = serde_json::from_str(&event_json)
        .map_err(|e| backend(format!("invalid queued event: {e}")))?;

    let queued_at: String = row.try_get("queued_at").map_err(backend)?;
    let queued_at = DateTime::parse_from_rfc3339(&queued_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| backend(format!("invalid queued_at: {e}")))?;

    let last_attempt_at: Option<String> = row.try_get("last_attempt_at").map_err(backend)?;
    let last_attempt_at = match last_attempt_at {
        Some(s) => Some(
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| backend(format!("invalid last_attempt_at: {e}")))?,
        ),
        None => None,
    };

    let attempts: i64 = row.try_get("attempts").map_err(backend)?;
    let acknowledged: i64 = row.try_get("acknowledged").map_err(backend)?;

    Ok(QueueEntry {
        event,
        queued_at,
        attempts: attempts as u32,
        last_attempt_at,
        acknowledged: acknowledged != 0,
    })
}

#[async_trait]
impl EventQueue for SqliteEventQueue {
    async fn enqueue(&self, event: EventEnvelope) -> Result<(), StorageError> {
        let event_id = event.event_id.as_str().to_string();
        let event_json = serde_json::to_string(&event).map_err(backend)?;

        sqlx::query(
            r#"
            INSERT INTO event_queue (event_id, event, queued_at, attempts, last_attempt_at, acknowledged)
            VALUES (?1, ?2, ?3, 0, NULL, 0)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&event_id)
        .bind(&event_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn get_pending(&self) -> Result<Vec<QueueEntry>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, event, queued_at, attempts, last_attempt_at, acknowledged
            FROM event_queue
            WHERE acknowledged = 0
            ORDER BY queued_at ASC, event_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(row_to_entry).collect()
    }

    async fn acknowledge(&self, event_id: &EventId) -> Result<(), StorageError> {
        sqlx::query("UPDATE event_queue SET acknowledged = 1 WHERE event_id = ?1")
            .bind(event_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn remove(&self, event_id: &EventId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM event_queue WHERE event_id = ?1")
            .bind(event_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn increment_attempt(&self, event_id: &EventId) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE event_queue
            SET attempts = attempts + 1,
                last_attempt_at = ?2
            WHERE event_id = ?1
            "#,
        )
        .bind(event_id.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn clear_acknowledged(&self) -> Result<usize, StorageError> {
        let result = sqlx::query("DELETE FROM event_queue WHERE acknowledged = 1")
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() as usize)
    }

    async fn pending_count(&self) -> Result<usize, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM event_queue WHERE acknowledged = 0")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        let n: i64 = row.try_get("n").map_err(backend)?;
        Ok(n as usize)
    }
}

/// SQLite cursor store sharing the queue's database.
#[derive(Debug, Clone)]
pub struct SqliteCursorStore {
    pool: SqlitePool,
}

impl SqliteCursorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_cursor(row: sqlx::sqlite::SqliteRow) -> Result<SyncCursor, StorageError> {
    let library_id: String = row.try_get("library_id").map_err(backend)?;
    let last_received_at: String = row.try_get("last_received_at").map_err(backend)?;
    let last_event_id: String = row.try_get("last_event_id").map_err(backend)?;
    let synced_at: String = row.try_get("synced_at").map_err(backend)?;

    Ok(SyncCursor {
        library_id: library_id.parse().map_err(backend)?,
        last_received_at: DateTime::parse_from_rfc3339(&last_received_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| backend(format!("invalid last_received_at: {e}")))?,
        last_event_id: last_event_id.parse().map_err(backend)?,
        synced_at: DateTime::parse_from_rfc3339(&synced_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| backend(format!("invalid synced_at: {e}")))?,
    })
}

#[async_trait]
impl SyncCursorStore for SqliteCursorStore {
    async fn get(&self, library_id: &LibraryId) -> Result<Option<SyncCursor>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT library_id, last_received_at, last_event_id, synced_at
            FROM sync_cursors
            WHERE library_id = ?1
            "#,
        )
        .bind(library_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(row_to_cursor).transpose()
    }

    async fn update(
        &self,
        library_id: &LibraryId,
        received_at: DateTime<Utc>,
        event_id: &EventId,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO sync_cursors (library_id, last_received_at, last_event_id, synced_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (library_id)
            DO UPDATE SET
                last_received_at = excluded.last_received_at,
                last_event_id = excluded.last_event_id,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(library_id.as_str())
        .bind(received_at.to_rfc3339())
        .bind(event_id.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn clear(&self, library_id: &LibraryId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM sync_cursors WHERE library_id = ?1")
            .bind(library_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SyncCursor>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT library_id, last_received_at, last_event_id, synced_at
            FROM sync_cursors
            ORDER BY library_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(row_to_cursor).collect()
    }
}
