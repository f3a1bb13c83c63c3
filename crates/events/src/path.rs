//! Canonical document paths.
//!
//! All storage paths are rooted at the store:
//!
//! - events: `users/{user_id}/libraries/{library_id}/events/{event_id}`
//! - views:  `users/{user_id}/libraries/{library_id}/views/{collection}/{entity_id}`
//! - session summaries: `users/{user_id}/libraries/{library_id}/session_summaries/{session_id}`

use retain_core::{DomainError, EventId, LibraryId, SessionId, UserId};

/// Per-entity view collections.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ViewCollection {
    CardSchedule,
    CardPerf,
    QuestionPerf,
    RelationshipSchedule,
    RelationshipPerf,
    MisconceptionEdge,
    ConceptCertification,
    Session,
    CardAnnotation,
}

impl ViewCollection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewCollection::CardSchedule => "card_schedule",
            ViewCollection::CardPerf => "card_perf",
            ViewCollection::QuestionPerf => "question_perf",
            ViewCollection::RelationshipSchedule => "relationship_schedule",
            ViewCollection::RelationshipPerf => "relationship_perf",
            ViewCollection::MisconceptionEdge => "misconception_edge",
            ViewCollection::ConceptCertification => "concept_certification",
            ViewCollection::Session => "session",
            ViewCollection::CardAnnotation => "card_annotation",
        }
    }
}

impl core::fmt::Display for ViewCollection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collection of all events for a `(user, library)` pair.
pub fn events_collection(user_id: &UserId, library_id: &LibraryId) -> String {
    format!("users/{user_id}/libraries/{library_id}/events")
}

/// Canonical event path; the `event_id` is the idempotency key.
pub fn event_path(user_id: &UserId, library_id: &LibraryId, event_id: &EventId) -> String {
    format!("users/{user_id}/libraries/{library_id}/events/{event_id}")
}

/// Collection of one view type for a `(user, library)` pair.
pub fn view_collection(
    user_id: &UserId,
    library_id: &LibraryId,
    collection: ViewCollection,
) -> String {
    format!("users/{user_id}/libraries/{library_id}/views/{collection}")
}

/// Path of a single view document.
pub fn view_path(
    user_id: &UserId,
    library_id: &LibraryId,
    collection: ViewCollection,
    entity_id: &str,
) -> String {
    format!("users/{user_id}/libraries/{library_id}/views/{collection}/{entity_id}")
}

/// Path of a session summary document.
pub fn session_summary_path(
    user_id: &UserId,
    library_id: &LibraryId,
    session_id: &SessionId,
) -> String {
    format!("users/{user_id}/libraries/{library_id}/session_summaries/{session_id}")
}

/// Build an event path from raw strings, enforcing identifier prefixes.
///
/// The typed helpers above are total; this is the checked entry point for
/// callers holding untyped identifiers.
pub fn event_path_checked(
    user_id: &str,
    library_id: &str,
    event_id: &str,
) -> Result<String, DomainError> {
    let user_id = UserId::parse(user_id)?;
    let library_id = LibraryId::parse(library_id)?;
    let event_id = EventId::parse(event_id)?;
    Ok(event_path(&user_id, &library_id, &event_id))
}
