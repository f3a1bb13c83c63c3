//! Inbound sync: pull new events after the per-library cursor.
//!
//! Events are ordered by `(received_at, event_id)`. The store query filters
//! on `received_at >= cursor` and the strict tie-break below drops what this
//! device has already consumed, so same-instant events are neither lost nor
//! re-reported.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use retain_core::{LibraryId, UserId};
use retain_events::{path, schema, EventEnvelope};
use retain_store::{CollectionQuery, DocumentStore, FieldFilter, FilterOp};

use crate::config::InboundConfig;
use crate::cursor_store::{SyncCursor, SyncCursorStore};
use crate::SyncError;

/// Result of one inbound pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InboundReport {
    pub events_received: usize,
    /// Newly pulled events, in `(received_at, event_id)` order.
    pub events: Vec<EventEnvelope>,
    /// Cursor after the pass (unchanged when nothing new arrived).
    pub cursor: Option<SyncCursor>,
}

/// Pulls events past the cursor and advances it.
#[derive(Clone)]
pub struct InboundSync {
    store: Arc<dyn DocumentStore>,
    cursors: Arc<dyn SyncCursorStore>,
    config: InboundConfig,
}

impl InboundSync {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cursors: Arc<dyn SyncCursorStore>,
        config: InboundConfig,
    ) -> Self {
        Self {
            store,
            cursors,
            config,
        }
    }

    /// Drain events newer than the cursor, up to `max_events`.
    pub async fn sync(
        &self,
        user_id: &UserId,
        library_id: &LibraryId,
    ) -> Result<InboundReport, SyncError> {
        let cursor = self.cursors.get(library_id).await?;
        let collection = path::events_collection(user_id, library_id);

        let mut kept: Vec<EventEnvelope> = Vec::new();
        let mut start_after: Option<JsonValue> = None;

        'pages: loop {
            let page_limit = self
                .config
                .batch_size
                .min(self.config.max_events - kept.len())
                .max(1);

            let mut query = CollectionQuery::new(collection.clone())
                .order_by("received_at")
                .order_by("event_id")
                .limit(page_limit);
            if let Some(c) = &cursor {
                // >= plus the tie-break below: same-instant events with a
                // higher event_id are new, equal-or-lower are consumed.
                query = query.filter(FieldFilter::new(
                    "received_at",
                    FilterOp::GtEq,
                    JsonValue::String(retain_events::timefmt::format(&c.last_received_at)),
                ));
            }
            if let Some(after) = &start_after {
                query = query.start_after(after.clone());
            }

            let page = self.store.query(query).await?;
            if page.is_empty() {
                break;
            }
            start_after = page.last().map(|(_, doc)| doc.clone());
            let page_len = page.len();

            for (_, doc) in page {
                let envelope = match schema::validate_envelope(&doc) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        tracing::warn!(error = %err, "skipping malformed event from feed");
                        continue;
                    }
                };

                if let Some(c) = &cursor {
                    let newer = envelope.received_at > c.last_received_at
                        || (envelope.received_at == c.last_received_at
                            && envelope.event_id > c.last_event_id);
                    if !newer {
                        continue;
                    }
                }

                kept.push(envelope);
                if kept.len() >= self.config.max_events {
                    break 'pages;
                }
            }

            if page_len < page_limit {
                break;
            }
        }

        if kept.is_empty() {
            return Ok(InboundReport {
                events_received: 0,
                events: Vec::new(),
                cursor,
            });
        }

        let last = kept.last().cloned();
        let report_cursor = if let Some(last) = last {
            self.cursors
                .update(library_id, last.received_at, &last.event_id)
                .await?;
            self.cursors.get(library_id).await?
        } else {
            cursor
        };

        tracing::info!(
            library_id = %library_id,
            events = kept.len(),
            "inbound sync finished"
        );

        Ok(InboundReport {
            events_received: kept.len(),
            events: kept,
            cursor: report_cursor,
        })
    }

    /// Forget the cursor so the next pass replays the library from the
    /// beginning.
    pub async fn force_full_resync(&self, library_id: &LibraryId) -> Result<(), SyncError> {
        self.cursors.clear(library_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use retain_store::InMemoryDocumentStore;

    use crate::cursor_store::InMemoryCursorStore;

    fn user() -> UserId {
        "user_1".parse().unwrap()
    }

    fn lib() -> LibraryId {
        "lib_1".parse().unwrap()
    }

    async fn seed_event(store: &InMemoryDocumentStore, event_id: &str, received_at: &str) {
        let doc = json!({
            "event_id": event_id,
            "type": "card_reviewed",
            "user_id": "user_1",
            "library_id": "lib_1",
            "occurred_at": received_at,
            "received_at": received_at,
            "device_id": "device-2",
            "entity": {"kind": "card", "id": "card_0001"},
            "payload": {"grade": "good", "seconds_spent": 5.0},
            "schema_version": "1"
        });
        store
            .create_if_absent(
                &format!("users/user_1/libraries/lib_1/events/{event_id}"),
                doc,
            )
            .await
            .unwrap();
    }

    fn inbound(
        store: Arc<InMemoryDocumentStore>,
        cursors: Arc<InMemoryCursorStore>,
        config: InboundConfig,
    ) -> InboundSync {
        InboundSync::new(store, cursors, config)
    }

    #[tokio::test]
    async fn first_sync_pulls_everything_and_sets_the_cursor() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let cursors = Arc::new(InMemoryCursorStore::new());
        seed_event(&store, "evt_a", "2025-01-01T00:00:00Z").await;
        seed_event(&store, "evt_b", "2025-01-02T00:00:00Z").await;

        let sync = inbound(store, cursors.clone(), InboundConfig::default());
        let report = sync.sync(&user(), &lib()).await.unwrap();

        assert_eq!(report.events_received, 2);
        let cursor = cursors.get(&lib()).await.unwrap().unwrap();
        assert_eq!(cursor.last_event_id.as_str(), "evt_b");
    }

    #[tokio::test]
    async fn second_sync_reports_nothing_new() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let cursors = Arc::new(InMemoryCursorStore::new());
        seed_event(&store, "evt_a", "2025-01-01T00:00:00Z").await;

        let sync = inbound(store, cursors, InboundConfig::default());
        sync.sync(&user(), &lib()).await.unwrap();

        let report = sync.sync(&user(), &lib()).await.unwrap();
        assert_eq!(report.events_received, 0);
        assert!(report.events.is_empty());
    }

    #[tokio::test]
    async fn same_instant_events_are_tie_broken_by_event_id() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let cursors = Arc::new(InMemoryCursorStore::new());
        seed_event(&store, "evt_a", "2025-01-01T00:00:00Z").await;
        seed_event(&store, "evt_b", "2025-01-01T00:00:00Z").await;

        let sync = inbound(store.clone(), cursors.clone(), InboundConfig::default());
        sync.sync(&user(), &lib()).await.unwrap();

        // A same-instant event with a higher id lands after the first drain.
        seed_event(&store, "evt_c", "2025-01-01T00:00:00Z").await;
        let report = sync.sync(&user(), &lib()).await.unwrap();

        assert_eq!(report.events_received, 1);
        assert_eq!(report.events[0].event_id.as_str(), "evt_c");
        let cursor = cursors.get(&lib()).await.unwrap().unwrap();
        assert_eq!(cursor.last_event_id.as_str(), "evt_c");
    }

    #[tokio::test]
    async fn pagination_respects_max_events() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let cursors = Arc::new(InMemoryCursorStore::new());
        for i in 0..10 {
            seed_event(&store, &format!("evt_{i:02}"), "2025-01-01T00:00:00Z").await;
        }

        let config = InboundConfig {
            batch_size: 3,
            max_events: 7,
        };
        let sync = inbound(store, cursors.clone(), config);
        let report = sync.sync(&user(), &lib()).await.unwrap();

        assert_eq!(report.events_received, 7);
        let cursor = cursors.get(&lib()).await.unwrap().unwrap();
        assert_eq!(cursor.last_event_id.as_str(), "evt_06");

        // The rest arrives on the next pass.
        let report = sync.sync(&user(), &lib()).await.unwrap();
        assert_eq!(report.events_received, 3);
    }

    #[tokio::test]
    async fn force_full_resync_clears_the_cursor() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let cursors = Arc::new(InMemoryCursorStore::new());
        seed_event(&store, "evt_a", "2025-01-01T00:00:00Z").await;

        let sync = inbound(store, cursors.clone(), InboundConfig::default());
        sync.sync(&user(), &lib()).await.unwrap();
        assert!(cursors.get(&lib()).await.unwrap().is_some());

        sync.force_full_resync(&lib()).await.unwrap();
        assert!(cursors.get(&lib()).await.unwrap().is_none());

        let report = sync.sync(&user(), &lib()).await.unwrap();
        assert_eq!(report.events_received, 1);
    }
}
