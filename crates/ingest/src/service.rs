//! Event ingestion.
//!
//! Validates incoming events, stamps the server acknowledgement time and
//! persists them with create-only semantics: the canonical path embeds the
//! `event_id`, so a duplicate upload is detected by the store and reported
//! as idempotent without a second write.
//!
//! Events of a known type get both validation stages (envelope + payload
//! schema); envelopes with a type this build does not know pass the
//! envelope stage only and round-trip to storage, where a newer projector
//! can pick them up.
//!
//! Ingestion writes events only; it never invokes the projector. Projection
//! is driven off the store's change feed or by a follow-on call from the
//! caller, and is safe for events that are already persisted.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use retain_core::{Clock, DomainError, EventId, LibraryId, SystemClock, UserId};
use retain_events::{path, schema, EventEnvelope};
use retain_store::{DocumentStore, StoreError, MAX_READ_BATCH};

/// Both validation stages for known event types; envelope only for unknown
/// types, which are allowed through for forward compatibility.
fn validate_incoming(raw: &JsonValue) -> Result<EventEnvelope, DomainError> {
    let envelope = schema::validate_envelope(raw)?;
    if envelope.kind().is_some() {
        schema::validate_payload(&envelope)?;
    }
    Ok(envelope)
}

/// Per-event outcome of an ingestion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionResult {
    pub success: bool,
    pub event_id: Option<EventId>,
    pub path: Option<String>,
    /// The event already existed; nothing was written.
    pub idempotent: bool,
    pub error: Option<String>,
}

impl IngestionResult {
    fn written(envelope: &EventEnvelope) -> Self {
        Self {
            success: true,
            event_id: Some(envelope.event_id.clone()),
            path: Some(envelope.path()),
            idempotent: false,
            error: None,
        }
    }

    fn duplicate(envelope: &EventEnvelope) -> Self {
        Self {
            success: true,
            event_id: Some(envelope.event_id.clone()),
            path: Some(envelope.path()),
            idempotent: true,
            error: None,
        }
    }

    fn rejected(error: impl core::fmt::Display) -> Self {
        Self {
            success: false,
            event_id: None,
            path: None,
            idempotent: false,
            error: Some(error.to_string()),
        }
    }
}

/// Validates and persists events.
pub struct IngestionService<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: DocumentStore> IngestionService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Validate one raw event and persist it create-only.
    ///
    /// Validation failures are terminal and never reach the store; store
    /// failures propagate (re-submission is safe).
    pub async fn ingest(&self, raw: &JsonValue) -> Result<IngestionResult, StoreError> {
        let mut envelope = match validate_incoming(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(error = %err, "rejected event at ingestion");
                return Ok(IngestionResult::rejected(err));
            }
        };

        // The server owns acknowledgement time.
        envelope.received_at = self.clock.now();

        let doc = serde_json::to_value(&envelope)
            .map_err(|e| StoreError::Codec(format!("event serialization failed: {e}")))?;

        let created = self.store.create_if_absent(&envelope.path(), doc).await?;
        if created {
            tracing::info!(
                event_id = %envelope.event_id,
                event_type = %envelope.event_type,
                "event ingested"
            );
            Ok(IngestionResult::written(&envelope))
        } else {
            Ok(IngestionResult::duplicate(&envelope))
        }
    }

    /// Batch variant. Per-event results preserve input order; idempotent and
    /// invalid entries are excluded from the batch write.
    pub async fn ingest_batch(
        &self,
        raws: &[JsonValue],
    ) -> Result<Vec<IngestionResult>, StoreError> {
        // Validate everything first so results line up with inputs.
        let mut validated: Vec<Result<EventEnvelope, String>> = Vec::with_capacity(raws.len());
        for raw in raws {
            validated.push(validate_incoming(raw).map_err(|e| e.to_string()));
        }

        // Existence-check the valid ones, de-duplicating within the batch.
        let received_at = self.clock.now();
        let mut results: Vec<IngestionResult> = Vec::with_capacity(raws.len());
        let mut writes: Vec<(String, JsonValue)> = Vec::new();
        let mut seen_in_batch: std::collections::HashSet<String> = std::collections::HashSet::new();

        let paths: Vec<Option<String>> = validated
            .iter()
            .map(|v| v.as_ref().ok().map(|e| e.path()))
            .collect();
        let existing = self.existing_paths(&paths).await?;

        for (validated, path) in validated.into_iter().zip(paths) {
            match validated {
                Err(error) => results.push(IngestionResult::rejected(error)),
                Ok(mut envelope) => {
                    let path = path.unwrap_or_else(|| envelope.path());
                    if existing.contains(&path) || !seen_in_batch.insert(path.clone()) {
                        results.push(IngestionResult::duplicate(&envelope));
                        continue;
                    }

                    envelope.received_at = received_at;
                    let doc = serde_json::to_value(&envelope).map_err(|e| {
                        StoreError::Codec(format!("event serialization failed: {e}"))
                    })?;
                    writes.push((path, doc));
                    results.push(IngestionResult::written(&envelope));
                }
            }
        }

        if !writes.is_empty() {
            let written = writes.len();
            self.store.batch_write(writes).await?;
            tracing::info!(count = written, "event batch ingested");
        }

        Ok(results)
    }

    /// Whether an event document exists at its canonical path.
    pub async fn exists(
        &self,
        user_id: &UserId,
        library_id: &LibraryId,
        event_id: &EventId,
    ) -> Result<bool, StoreError> {
        let path = path::event_path(user_id, library_id, event_id);
        Ok(self.store.read(&path).await?.is_some())
    }

    /// Which of the given paths already hold a document, resolved in
    /// read-batch-sized windows.
    async fn existing_paths(
        &self,
        paths: &[Option<String>],
    ) -> Result<std::collections::HashSet<String>, StoreError> {
        let to_check: Vec<String> = paths.iter().flatten().cloned().collect();
        let mut existing = std::collections::HashSet::new();

        for window in to_check.chunks(MAX_READ_BATCH) {
            let docs = self.store.read_many(window).await?;
            for (path, doc) in window.iter().zip(docs) {
                if doc.is_some() {
                    existing.insert(path.clone());
                }
            }
        }

        Ok(existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use retain_core::FixedClock;
    use retain_store::InMemoryDocumentStore;
    use serde_json::json;

    fn raw_event(event_id: &str) -> JsonValue {
        json!({
            "event_id": event_id,
            "type": "card_reviewed",
            "user_id": "user_1",
            "library_id": "lib_1",
            "occurred_at": "2025-01-01T00:00:00Z",
            "received_at": "2025-01-01T00:00:00Z",
            "device_id": "device-1",
            "entity": {"kind": "card", "id": "card_0001"},
            "payload": {"grade": "good", "seconds_spent": 18.0},
            "schema_version": "1"
        })
    }

    fn service(
        store: Arc<InMemoryDocumentStore>,
    ) -> IngestionService<Arc<InMemoryDocumentStore>> {
        let clock = FixedClock::new(
            "2025-02-01T00:00:00Z".parse::<DateTime<chrono::Utc>>().unwrap(),
        );
        IngestionService::with_clock(store, Arc::new(clock))
    }

    #[tokio::test]
    async fn ingest_then_exists() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let service = service(store.clone());

        let result = service.ingest(&raw_event("evt_a")).await.unwrap();
        assert!(result.success);
        assert!(!result.idempotent);
        assert_eq!(
            result.path.as_deref(),
            Some("users/user_1/libraries/lib_1/events/evt_a")
        );

        let exists = service
            .exists(
                &"user_1".parse().unwrap(),
                &"lib_1".parse().unwrap(),
                &"evt_a".parse().unwrap(),
            )
            .await
            .unwrap();
        assert!(exists);
    }

    #[tokio::test]
    async fn second_ingest_is_idempotent_with_no_second_write() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let service = service(store.clone());

        service.ingest(&raw_event("evt_a")).await.unwrap();
        let first_doc = store
            .read("users/user_1/libraries/lib_1/events/evt_a")
            .await
            .unwrap();

        let result = service.ingest(&raw_event("evt_a")).await.unwrap();
        assert!(result.success);
        assert!(result.idempotent);

        let second_doc = store
            .read("users/user_1/libraries/lib_1/events/evt_a")
            .await
            .unwrap();
        assert_eq!(first_doc, second_doc);
    }

    #[tokio::test]
    async fn ingestion_stamps_received_at() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let service = service(store.clone());

        service.ingest(&raw_event("evt_a")).await.unwrap();
        let doc = store
            .read("users/user_1/libraries/lib_1/events/evt_a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["received_at"], json!("2025-02-01T00:00:00.000000Z"));
    }

    #[tokio::test]
    async fn invalid_event_never_reaches_the_store() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let service = service(store.clone());

        let mut raw = raw_event("evt_a");
        raw["payload"]["streak"] = json!(4);

        let result = service.ingest(&raw).await.unwrap();
        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn known_type_with_out_of_range_payload_is_rejected() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let service = service(store.clone());

        let mut raw = raw_event("evt_a");
        raw["payload"]["seconds_spent"] = json!(-1.0);

        let result = service.ingest(&raw).await.unwrap();
        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unknown_type_round_trips_through_ingestion() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let service = service(store.clone());

        let mut raw = raw_event("evt_a");
        raw["type"] = json!("card_summoned");

        let result = service.ingest(&raw).await.unwrap();
        assert!(result.success);
        assert!(!store.is_empty());
    }

    #[tokio::test]
    async fn batch_preserves_order_and_reports_duplicates() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let service = service(store.clone());

        // evt_a pre-exists; the batch holds a duplicate pair of evt_c.
        service.ingest(&raw_event("evt_a")).await.unwrap();

        let mut invalid = raw_event("evt_b");
        invalid["payload"]["seconds_spent"] = json!(-1.0);

        let batch = vec![
            raw_event("evt_a"),
            invalid,
            raw_event("evt_c"),
            raw_event("evt_c"),
            raw_event("evt_d"),
        ];
        let results = service.ingest_batch(&batch).await.unwrap();

        assert_eq!(results.len(), 5);
        assert!(results[0].success && results[0].idempotent);
        assert!(!results[1].success);
        assert!(results[2].success && !results[2].idempotent);
        assert!(results[3].success && results[3].idempotent);
        assert!(results[4].success && !results[4].idempotent);

        // Two fresh events were written on top of the pre-existing one.
        assert_eq!(store.len(), 3);
    }
}
