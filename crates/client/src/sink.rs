//! Upload target for outbound sync.
//!
//! In production this fronts the ingestion endpoint over the network; in
//! tests and single-process deployments the ingestion service itself is the
//! sink.

use async_trait::async_trait;
use thiserror::Error;

use retain_events::EventEnvelope;
use retain_ingest::IngestionService;
use retain_store::DocumentStore;

#[derive(Debug, Error)]
pub enum SinkError {
    /// Transport-level failure: nothing can be said about individual events;
    /// the whole window should be retried.
    #[error("event sink transport failure: {0}")]
    Transport(String),
}

/// Per-event upload outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkResult {
    pub success: bool,
    pub idempotent: bool,
    pub error: Option<String>,
}

/// Accepts batches of events for ingestion.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Submit a window of events. Results preserve input order.
    async fn submit_batch(&self, events: &[EventEnvelope]) -> Result<Vec<SinkResult>, SinkError>;
}

/// Loopback sink: hand events straight to an in-process ingestion service.
#[async_trait]
impl<S: DocumentStore> EventSink for IngestionService<S> {
    async fn submit_batch(&self, events: &[EventEnvelope]) -> Result<Vec<SinkResult>, SinkError> {
        let raws: Vec<serde_json::Value> = events
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()
            .map_err(|e| SinkError::Transport(format!("event serialization failed: {e}")))?;

        let results = self
            .ingest_batch(&raws)
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        Ok(results
            .into_iter()
            .map(|r| SinkResult {
                success: r.success,
                idempotent: r.idempotent,
                error: r.error,
            })
            .collect())
    }
}
