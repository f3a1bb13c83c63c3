//! Postgres-backed document store.
//!
//! One `documents` table keyed by path; the collection column denormalizes
//! the parent path for scan queries. Documents live in a JSONB column, so
//! `query` can filter and order on document fields directly
//! (`doc->>'received_at'` etc.). Timestamps are ISO-8601 text in the
//! documents; text order is chronological order.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::adapter::{DocumentStore, StoreError, TxnBody, MAX_READ_BATCH};
use crate::query::{CollectionQuery, FilterOp};

/// Retries for conflicted transactions before giving up.
const TXN_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct PostgresStoreConfig {
    pub url: String,
    pub max_connections: u32,
    pub read_timeout: Duration,
    pub transaction_timeout: Duration,
}

impl PostgresStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            read_timeout: Duration::from_secs(10),
            transaction_timeout: Duration::from_secs(15),
        }
    }
}

pub struct PostgresDocumentStore {
    pool: PgPool,
    read_timeout: Duration,
    transaction_timeout: Duration,
}

impl PostgresDocumentStore {
    pub async fn connect(config: PostgresStoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(backend)?;

        Ok(Self {
            pool,
            read_timeout: config.read_timeout,
            transaction_timeout: config.transaction_timeout,
        })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        let config = PostgresStoreConfig::new("");
        Self {
            pool,
            read_timeout: config.read_timeout,
            transaction_timeout: config.transaction_timeout,
        }
    }

    /// Create the backing table and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                path        TEXT PRIMARY KEY,
                collection  TEXT NOT NULL,
                doc         JSONB NOT NULL,
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS documents_collection_idx
            ON documents (collection)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn with_read_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.read_timeout, fut)
            .await
            .map_err(|_| StoreError::Backend("store read timed out".to_string()))?
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn collection_of(path: &str) -> Result<&str, StoreError> {
    path.rsplit_once('/')
        .map(|(collection, _)| collection)
        .ok_or_else(|| StoreError::InvalidRequest(format!("path '{path}' has no collection")))
}

/// Serialization failures are retried; everything else surfaces.
fn is_conflict(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("40001")
    )
}

/// Field names appear verbatim in generated SQL; restrict them to the
/// document-field grammar.
fn validate_field(field: &str) -> Result<(), StoreError> {
    if field.is_empty()
        || !field
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(StoreError::InvalidRequest(format!(
            "invalid query field '{field}'"
        )));
    }
    Ok(())
}

fn scalar_as_text(value: &JsonValue) -> Result<String, StoreError> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        other => Err(StoreError::InvalidRequest(format!(
            "non-scalar query value: {other}"
        ))),
    }
}

async fn upsert(
    executor: &mut sqlx::PgConnection,
    path: &str,
    doc: &JsonValue,
) -> Result<(), sqlx::Error> {
    let collection = path.rsplit_once('/').map(|(c, _)| c).unwrap_or("");
    sqlx::query(
        r#"
        INSERT INTO documents (path, collection, doc)
        VALUES ($1, $2, $3)
        ON CONFLICT (path)
        DO UPDATE SET doc = EXCLUDED.doc, updated_at = NOW()
        "#,
    )
    .bind(path)
    .bind(collection)
    .bind(doc)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn create_if_absent(&self, path: &str, doc: JsonValue) -> Result<bool, StoreError> {
        let collection = collection_of(path)?.to_string();
        self.with_read_timeout(async {
            let result = sqlx::query(
                r#"
                INSERT INTO documents (path, collection, doc)
                VALUES ($1, $2, $3)
                ON CONFLICT (path) DO NOTHING
                "#,
            )
            .bind(path)
            .bind(&collection)
            .bind(&doc)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

            Ok(result.rows_affected() == 1)
        })
        .await
    }

    async fn read(&self, path: &str) -> Result<Option<JsonValue>, StoreError> {
        self.with_read_timeout(async {
            let row = sqlx::query("SELECT doc FROM documents WHERE path = $1")
                .bind(path)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

            Ok(row.map(|r| r.get::<JsonValue, _>("doc")))
        })
        .await
    }

    async fn read_many(&self, paths: &[String]) -> Result<Vec<Option<JsonValue>>, StoreError> {
        if paths.len() > MAX_READ_BATCH {
            return Err(StoreError::InvalidRequest(format!(
                "read_many batch of {} exceeds the ceiling of {MAX_READ_BATCH}",
                paths.len()
            )));
        }

        self.with_read_timeout(async {
            let rows = sqlx::query("SELECT path, doc FROM documents WHERE path = ANY($1)")
                .bind(paths)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

            let found: std::collections::HashMap<String, JsonValue> = rows
                .into_iter()
                .map(|r| (r.get::<String, _>("path"), r.get::<JsonValue, _>("doc")))
                .collect();

            Ok(paths.iter().map(|p| found.get(p).cloned()).collect())
        })
        .await
    }

    async fn write(&self, path: &str, doc: JsonValue) -> Result<(), StoreError> {
        self.with_read_timeout(async {
            let mut conn = self.pool.acquire().await.map_err(backend)?;
            upsert(&mut *conn, path, &doc).await.map_err(backend)
        })
        .await
    }

    async fn batch_write(&self, writes: Vec<(String, JsonValue)>) -> Result<(), StoreError> {
        self.with_read_timeout(async {
            let mut txn = self.pool.begin().await.map_err(backend)?;
            for (path, doc) in &writes {
                upsert(&mut *txn, path, doc).await.map_err(backend)?;
            }
            txn.commit().await.map_err(backend)
        })
        .await
    }

    async fn transaction(
        &self,
        read_paths: Vec<String>,
        mut body: TxnBody<'_>,
    ) -> Result<usize, StoreError> {
        let deadline = tokio::time::Instant::now() + self.transaction_timeout;

        let mut last_conflict = String::new();
        for _attempt in 0..TXN_RETRIES {
            let attempt = async {
                let mut txn = self.pool.begin().await.map_err(backend)?;

                let rows = sqlx::query(
                    "SELECT path, doc FROM documents WHERE path = ANY($1) FOR UPDATE",
                )
                .bind(&read_paths)
                .fetch_all(&mut *txn)
                .await
                .map_err(backend)?;

                let found: std::collections::HashMap<String, JsonValue> = rows
                    .into_iter()
                    .map(|r| (r.get::<String, _>("path"), r.get::<JsonValue, _>("doc")))
                    .collect();
                let snapshot: Vec<Option<JsonValue>> =
                    read_paths.iter().map(|p| found.get(p).cloned()).collect();

                let writes = body(&snapshot)?;
                let written = writes.len();
                for (path, doc) in &writes {
                    upsert(&mut *txn, path, doc).await.map_err(|e| {
                        if is_conflict(&e) {
                            StoreError::Conflict(e.to_string())
                        } else {
                            backend(e)
                        }
                    })?;
                }

                txn.commit().await.map_err(|e| {
                    if is_conflict(&e) {
                        StoreError::Conflict(e.to_string())
                    } else {
                        backend(e)
                    }
                })?;

                Ok(written)
            };

            match tokio::time::timeout_at(deadline, attempt).await {
                Err(_) => {
                    return Err(StoreError::Backend(
                        "store transaction timed out".to_string(),
                    ))
                }
                Ok(Ok(written)) => return Ok(written),
                Ok(Err(StoreError::Conflict(msg))) => {
                    tracing::debug!(conflict = %msg, "retrying conflicted transaction");
                    last_conflict = msg;
                }
                Ok(Err(other)) => return Err(other),
            }
        }

        Err(StoreError::Conflict(format!(
            "transaction retries exhausted: {last_conflict}"
        )))
    }

    async fn query(
        &self,
        query: CollectionQuery,
    ) -> Result<Vec<(String, JsonValue)>, StoreError> {
        for field in &query.order_by {
            validate_field(field)?;
        }

        let mut sql = String::from("SELECT path, doc FROM documents WHERE collection = $1");
        let mut binds: Vec<String> = Vec::new();

        if let Some(filter) = &query.filter {
            validate_field(&filter.field)?;
            let op = match filter.op {
                FilterOp::Gt => ">",
                FilterOp::GtEq => ">=",
                FilterOp::Lt => "<",
                FilterOp::LtEq => "<=",
                FilterOp::Eq => "=",
            };
            binds.push(scalar_as_text(&filter.value)?);
            sql.push_str(&format!(
                " AND doc->>'{}' {} ${}",
                filter.field,
                op,
                binds.len() + 1
            ));
        }

        if let Some(after) = &query.start_after {
            if !query.order_by.is_empty() {
                let lhs: Vec<String> = query
                    .order_by
                    .iter()
                    .map(|f| format!("doc->>'{f}'"))
                    .collect();
                let mut rhs: Vec<String> = Vec::new();
                for field in &query.order_by {
                    let value = after.get(field).unwrap_or(&JsonValue::Null);
                    binds.push(scalar_as_text(value)?);
                    rhs.push(format!("${}", binds.len() + 1));
                }
                sql.push_str(&format!(
                    " AND ({}) > ({})",
                    lhs.join(", "),
                    rhs.join(", ")
                ));
            }
        }

        if !query.order_by.is_empty() {
            let order: Vec<String> = query
                .order_by
                .iter()
                .map(|f| format!("doc->>'{f}' ASC"))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }

        if query.limit != usize::MAX {
            sql.push_str(&format!(" LIMIT {}", query.limit));
        }

        self.with_read_timeout(async {
            let mut q = sqlx::query(&sql).bind(&query.collection);
            for value in &binds {
                q = q.bind(value);
            }

            let rows = q.fetch_all(&self.pool).await.map_err(backend)?;
            Ok(rows
                .into_iter()
                .map(|r| (r.get::<String, _>("path"), r.get::<JsonValue, _>("doc")))
                .collect())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_is_parent_path() {
        assert_eq!(
            collection_of("users/u/libraries/l/events/evt_a").unwrap(),
            "users/u/libraries/l/events"
        );
        assert!(collection_of("rootdoc").is_err());
    }

    #[test]
    fn query_fields_are_restricted() {
        assert!(validate_field("received_at").is_ok());
        assert!(validate_field("due_at").is_ok());
        assert!(validate_field("doc'; DROP TABLE documents; --").is_err());
        assert!(validate_field("").is_err());
    }

    #[test]
    fn scalars_render_as_text() {
        assert_eq!(
            scalar_as_text(&serde_json::json!("2025-01-01T00:00:00Z")).unwrap(),
            "2025-01-01T00:00:00Z"
        );
        assert_eq!(scalar_as_text(&serde_json::json!(3)).unwrap(), "3");
        assert!(scalar_as_text(&serde_json::json!({"a": 1})).is_err());
    }
}
