//! Document store capability surface.
//!
//! A thin contract over a hierarchical document store. Events rely on
//! `create_if_absent` for idempotent appends; views rely on `write` and
//! `transaction`; inbound sync and due-card scans rely on `query`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::query::CollectionQuery;

/// Ceiling on `read_many` batch size.
pub const MAX_READ_BATCH: usize = 10;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Caller-side misuse: oversized batch, malformed query field, etc.
    #[error("invalid store request: {0}")]
    InvalidRequest(String),

    /// Transaction lost its conflict retries.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// A document failed to serialize/deserialize.
    #[error("document codec failure: {0}")]
    Codec(String),

    /// Backend failure (connection, timeout, I/O). Safe to retry; events are
    /// protected by create-only semantics, views by the projection cursor.
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Transaction body: receives the documents at `read_paths` (order
/// preserved) and returns the writes to commit atomically with those reads.
///
/// The body may run more than once when the backend retries a conflicted
/// commit; it must be side-effect free apart from its captured outputs.
pub type TxnBody<'a> =
    Box<dyn FnMut(&[Option<JsonValue>]) -> Result<Vec<(String, JsonValue)>, StoreError> + Send + 'a>;

/// Capability surface over the concrete document store.
///
/// Paths are `/`-separated; the parent of a document is its collection.
/// Events are written only via `create_if_absent` and never rewritten.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Atomic create-only write. Returns `true` when the document was
    /// created, `false` when the path already existed (no modification).
    async fn create_if_absent(&self, path: &str, doc: JsonValue) -> Result<bool, StoreError>;

    async fn read(&self, path: &str) -> Result<Option<JsonValue>, StoreError>;

    /// Read up to [`MAX_READ_BATCH`] documents, preserving input order.
    async fn read_many(&self, paths: &[String]) -> Result<Vec<Option<JsonValue>>, StoreError>;

    /// Overwrite a document (views only).
    async fn write(&self, path: &str, doc: JsonValue) -> Result<(), StoreError>;

    /// Write several documents in one atomic batch.
    async fn batch_write(&self, writes: Vec<(String, JsonValue)>) -> Result<(), StoreError>;

    /// Read `read_paths`, run `body`, commit its writes in the same unit.
    /// Conflicts are retried per backend policy. Returns the number of
    /// documents written.
    async fn transaction(
        &self,
        read_paths: Vec<String>,
        body: TxnBody<'_>,
    ) -> Result<usize, StoreError>;

    /// Ordered range scan over the direct children of a collection.
    /// Returns `(path, document)` pairs so callers can identify entities.
    async fn query(&self, query: CollectionQuery)
        -> Result<Vec<(String, JsonValue)>, StoreError>;
}

#[async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn create_if_absent(&self, path: &str, doc: JsonValue) -> Result<bool, StoreError> {
        (**self).create_if_absent(path, doc).await
    }

    async fn read(&self, path: &str) -> Result<Option<JsonValue>, StoreError> {
        (**self).read(path).await
    }

    async fn read_many(&self, paths: &[String]) -> Result<Vec<Option<JsonValue>>, StoreError> {
        (**self).read_many(paths).await
    }

    async fn write(&self, path: &str, doc: JsonValue) -> Result<(), StoreError> {
        (**self).write(path, doc).await
    }

    async fn batch_write(&self, writes: Vec<(String, JsonValue)>) -> Result<(), StoreError> {
        (**self).batch_write(writes).await
    }

    async fn transaction(
        &self,
        read_paths: Vec<String>,
        body: TxnBody<'_>,
    ) -> Result<usize, StoreError> {
        (**self).transaction(read_paths, body).await
    }

    async fn query(
        &self,
        query: CollectionQuery,
    ) -> Result<Vec<(String, JsonValue)>, StoreError> {
        (**self).query(query).await
    }
}
