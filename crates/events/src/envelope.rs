//! The append-only event envelope.
//!
//! An envelope wraps a raw action payload with the identity and ordering
//! metadata the pipeline needs: who, which library, which entity, when it
//! happened on the device, and when the server acknowledged it. The envelope
//! is the unit of persistence; once written it is never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use retain_core::{DeviceId, DomainError, EntityRef, EventId, LibraryId, UserId};

use crate::cursor::EventCursor;
use crate::path;
use crate::payload::{EventKind, EventPayload};

/// Current payload schema version stamped on newly built events.
pub const SCHEMA_VERSION: &str = "1";

/// Immutable event record.
///
/// `event_type` is kept as a raw string so envelopes with types this build
/// does not know can still round-trip through ingestion and storage; use
/// [`EventEnvelope::kind`] to resolve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventEnvelope {
    pub event_id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    pub user_id: UserId,
    pub library_id: LibraryId,
    pub occurred_at: DateTime<Utc>,
    #[serde(with = "crate::timefmt")]
    pub received_at: DateTime<Utc>,
    pub device_id: DeviceId,
    pub entity: EntityRef,
    pub payload: JsonValue,
    pub schema_version: String,
}

impl EventEnvelope {
    /// Resolve the event type; `None` when this build does not know it.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::lookup(&self.event_type)
    }

    /// Decode and validate the payload against the schema for this type.
    ///
    /// Fails for unknown types; callers that tolerate them should check
    /// [`EventEnvelope::kind`] first.
    pub fn typed_payload(&self) -> Result<EventPayload, DomainError> {
        let kind = self.kind().ok_or_else(|| {
            DomainError::validation(format!("unknown event type '{}'", self.event_type))
        })?;
        EventPayload::decode(kind, &self.payload)
    }

    /// Position of this event in the per-library `(received_at, event_id)`
    /// order.
    pub fn cursor(&self) -> EventCursor {
        EventCursor::new(self.received_at, self.event_id.clone())
    }

    /// Canonical storage path. Total on valid envelopes: the typed
    /// identifiers guarantee their prefixes.
    pub fn path(&self) -> String {
        path::event_path(&self.user_id, &self.library_id, &self.event_id)
    }

    /// Collection holding this event.
    pub fn collection(&self) -> String {
        path::events_collection(&self.user_id, &self.library_id)
    }
}
