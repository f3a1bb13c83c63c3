//! Local event queue.
//!
//! Durable, per-device queue of events not yet acknowledged by ingestion.
//! Keyed by `event_id`. Callers must not rely on FIFO order for correctness;
//! ordering only drives backoff fairness — correctness lives in the
//! projector's cursor.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use retain_core::EventId;
use retain_events::EventEnvelope;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("client storage failure: {0}")]
    Backend(String),
}

/// One queued event with its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub event: EventEnvelope,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub acknowledged: bool,
}

impl QueueEntry {
    pub fn new(event: EventEnvelope, queued_at: DateTime<Utc>) -> Self {
        Self {
            event,
            queued_at,
            attempts: 0,
            last_attempt_at: None,
            acknowledged: false,
        }
    }
}

/// Durable queue of unsent events.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Add an event. Re-enqueueing an existing `event_id` is a no-op.
    async fn enqueue(&self, event: EventEnvelope) -> Result<(), StorageError>;

    /// Unacknowledged entries, oldest first.
    async fn get_pending(&self) -> Result<Vec<QueueEntry>, StorageError>;

    async fn acknowledge(&self, event_id: &EventId) -> Result<(), StorageError>;

    async fn remove(&self, event_id: &EventId) -> Result<(), StorageError>;

    async fn increment_attempt(&self, event_id: &EventId) -> Result<(), StorageError>;

    /// Drop acknowledged entries; returns how many were removed.
    async fn clear_acknowledged(&self) -> Result<usize, StorageError>;

    async fn pending_count(&self) -> Result<usize, StorageError>;
}

/// In-memory queue for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryEventQueue {
    entries: Mutex<HashMap<String, QueueEntry>>,
}

impl InMemoryEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, QueueEntry>>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Backend("queue lock poisoned".to_string()))
    }
}

#[async_trait]
impl EventQueue for InMemoryEventQueue {
    async fn enqueue(&self, event: EventEnvelope) -> Result<(), StorageError> {
        let mut entries = self.lock()?;
        let key = event.event_id.as_str().to_string();
        entries
            .entry(key)
            .or_insert_with(|| QueueEntry::new(event, Utc::now()));
        Ok(())
    }

    async fn get_pending(&self) -> Result<Vec<QueueEntry>, StorageError> {
        let entries = self.lock()?;
        let mut pending: Vec<QueueEntry> = entries
            .values()
            .filter(|e| !e.acknowledged)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.queued_at
                .cmp(&b.queued_at)
                .then_with(|| a.event.event_id.cmp(&b.event.event_id))
        });
        Ok(pending)
    }

    async fn acknowledge(&self, event_id: &EventId) -> Result<(), StorageError> {
        let mut entries = self.lock()?;
        if let Some(entry) = entries.get_mut(event_id.as_str()) {
            entry.acknowledged = true;
        }
        Ok(())
    }

    async fn remove(&self, event_id: &EventId) -> Result<(), StorageError> {
        self.lock()?.remove(event_id.as_str());
        Ok(())
    }

    async fn increment_attempt(&self, event_id: &EventId) -> Result<(), StorageError> {
        let mut entries = self.lock()?;
        if let Some(entry) = entries.get_mut(event_id.as_str()) {
            entry.attempts += 1;
            entry.last_attempt_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn clear_acknowledged(&self) -> Result<usize, StorageError> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, e| !e.acknowledged);
        Ok(before - entries.len())
    }

    async fn pending_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.values().filter(|e| !e.acknowledged).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_id: &str) -> EventEnvelope {
        serde_json::from_value(json!({
            "event_id": event_id,
            "type": "card_reviewed",
            "user_id": "user_1",
            "library_id": "lib_1",
            "occurred_at": "2025-01-01T00:00:00Z",
            "received_at": "2025-01-01T00:00:00Z",
            "device_id": "device-1",
            "entity": {"kind": "card", "id": "card_0001"},
            "payload": {"grade": "good", "seconds_spent": 5.0},
            "schema_version": "1"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn enqueue_is_keyed_by_event_id() {
        let queue = InMemoryEventQueue::new();
        queue.enqueue(event("evt_a")).await.unwrap();
        queue.enqueue(event("evt_a")).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn acknowledge_hides_then_clear_drops() {
        let queue = InMemoryEventQueue::new();
        queue.enqueue(event("evt_a")).await.unwrap();
        queue.enqueue(event("evt_b")).await.unwrap();

        let id = "evt_a".parse().unwrap();
        queue.acknowledge(&id).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 1);
        assert_eq!(queue.get_pending().await.unwrap().len(), 1);

        assert_eq!(queue.clear_acknowledged().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn attempts_accumulate() {
        let queue = InMemoryEventQueue::new();
        queue.enqueue(event("evt_a")).await.unwrap();

        let id: EventId = "evt_a".parse().unwrap();
        queue.increment_attempt(&id).await.unwrap();
        queue.increment_attempt(&id).await.unwrap();

        let pending = queue.get_pending().await.unwrap();
        assert_eq!(pending[0].attempts, 2);
        assert!(pending[0].last_attempt_at.is_some());
    }
}
