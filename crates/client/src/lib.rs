//! Offline-first client: local queue, outbound/inbound sync, sync engine and
//! action helpers.

use thiserror::Error;

pub mod actions;
pub mod config;
pub mod cursor_store;
pub mod engine;
pub mod inbound;
pub mod outbound;
pub mod queue;
pub mod sink;
pub mod sqlite;


pub use actions::ClientApi;
pub use config::{EngineConfig, InboundConfig, OutboundConfig, SyncConfig};
pub use cursor_store::{InMemoryCursorStore, SyncCursor, SyncCursorStore};
pub use engine::{SyncAllReport, SyncEngine, SyncStatus};
pub use inbound::{InboundReport, InboundSync};
pub use outbound::{OutboundReport, OutboundSync};
pub use queue::{EventQueue, InMemoryEventQueue, QueueEntry, StorageError};
pub use sink::{EventSink, SinkError, SinkResult};
pub use sqlite::{open_client_db, SqliteCursorStore, SqliteEventQueue};

/// Client-side sync failure.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connectivity is off; nothing touched the store.
    #[error("Device is offline")]
    Offline,

    /// The event failed validation before queueing. Caller-fixable.
    #[error("validation failed: {0}")]
    Validation(#[from] retain_core::DomainError),

    /// Local queue/cursor storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The event feed (document store) failed; safe to retry.
    #[error(transparent)]
    Store(#[from] retain_store::StoreError),
}
