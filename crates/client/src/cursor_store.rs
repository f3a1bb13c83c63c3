//! Per-library sync cursor persistence.
//!
//! The cursor marks how far this device has consumed the per-library event
//! order. It is device-local, written only by inbound sync, and monotone
//! non-decreasing in `(received_at, event_id)`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retain_core::{EventId, LibraryId};

use crate::queue::StorageError;

/// Device-local consumption position for one library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub library_id: LibraryId,
    pub last_received_at: DateTime<Utc>,
    pub last_event_id: EventId,
    pub synced_at: DateTime<Utc>,
}

#[async_trait]
pub trait SyncCursorStore: Send + Sync {
    async fn get(&self, library_id: &LibraryId) -> Result<Option<SyncCursor>, StorageError>;

    async fn update(
        &self,
        library_id: &LibraryId,
        received_at: DateTime<Utc>,
        event_id: &EventId,
    ) -> Result<(), StorageError>;

    /// Forget the cursor; the next inbound sync starts from the beginning.
    async fn clear(&self, library_id: &LibraryId) -> Result<(), StorageError>;

    async fn list(&self) -> Result<Vec<SyncCursor>, StorageError>;
}

/// In-memory cursor store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: Mutex<HashMap<String, SyncCursor>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SyncCursor>>, StorageError> {
        self.cursors
            .lock()
            .map_err(|_| StorageError::Backend("cursor lock poisoned".to_string()))
    }
}

#[async_trait]
impl SyncCursorStore for InMemoryCursorStore {
    async fn get(&self, library_id: &LibraryId) -> Result<Option<SyncCursor>, StorageError> {
        Ok(self.lock()?.get(library_id.as_str()).cloned())
    }

    async fn update(
        &self,
        library_id: &LibraryId,
        received_at: DateTime<Utc>,
        event_id: &EventId,
    ) -> Result<(), StorageError> {
        let mut cursors = self.lock()?;
        cursors.insert(
            library_id.as_str().to_string(),
            SyncCursor {
                library_id: library_id.clone(),
                last_received_at: received_at,
                last_event_id: event_id.clone(),
                synced_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn clear(&self, library_id: &LibraryId) -> Result<(), StorageError> {
        self.lock()?.remove(library_id.as_str());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SyncCursor>, StorageError> {
        let mut cursors: Vec<SyncCursor> = self.lock()?.values().cloned().collect();
        cursors.sort_by(|a, b| a.library_id.cmp(&b.library_id));
        Ok(cursors)
    }
}
