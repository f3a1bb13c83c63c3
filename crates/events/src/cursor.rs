//! Per-view idempotency cursor.
//!
//! Every view document stores the `(received_at, event_id)` of the last event
//! applied to it. Delivery to the projector is at-least-once and unordered;
//! this cursor is what turns that into exactly-once application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retain_core::EventId;

/// `(received_at, event_id)` position of an event in the per-library order.
///
/// Ordering is lexicographic: `received_at` first, `event_id` as tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventCursor {
    pub received_at: DateTime<Utc>,
    pub event_id: EventId,
}

impl EventCursor {
    pub fn new(received_at: DateTime<Utc>, event_id: EventId) -> Self {
        Self {
            received_at,
            event_id,
        }
    }

    /// Decide whether an event at `candidate` may be applied over a view whose
    /// cursor is `prev`.
    ///
    /// - no prior view: apply
    /// - same `event_id`: skip (duplicate delivery)
    /// - later `received_at`: apply
    /// - equal `received_at`, distinct `event_id`: apply (same-instant event;
    ///   whichever lands second observes the first's cursor)
    /// - earlier `received_at`: skip (newer state already present)
    pub fn should_apply(prev: Option<&EventCursor>, candidate: &EventCursor) -> bool {
        match prev {
            None => true,
            Some(p) => {
                if candidate.event_id == p.event_id {
                    return false;
                }
                candidate.received_at >= p.received_at
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(ts: &str, id: &str) -> EventCursor {
        EventCursor::new(
            ts.parse().unwrap(),
            EventId::parse(id).unwrap(),
        )
    }

    #[test]
    fn applies_with_no_prior_view() {
        let c = cursor("2025-01-01T00:00:00Z", "evt_a");
        assert!(EventCursor::should_apply(None, &c));
    }

    #[test]
    fn skips_duplicate_event_id() {
        let prev = cursor("2025-01-01T00:00:00Z", "evt_a");
        let dup = cursor("2025-01-01T00:00:00Z", "evt_a");
        assert!(!EventCursor::should_apply(Some(&prev), &dup));
    }

    #[test]
    fn applies_newer_received_at() {
        let prev = cursor("2025-01-01T00:00:00Z", "evt_a");
        let next = cursor("2025-01-02T00:00:00Z", "evt_b");
        assert!(EventCursor::should_apply(Some(&prev), &next));
    }

    #[test]
    fn skips_older_received_at() {
        let prev = cursor("2025-01-02T00:00:00Z", "evt_b");
        let stale = cursor("2025-01-01T00:00:00Z", "evt_a");
        assert!(!EventCursor::should_apply(Some(&prev), &stale));
    }

    #[test]
    fn applies_same_instant_distinct_event() {
        let prev = cursor("2025-01-01T00:00:00Z", "evt_a");
        let peer = cursor("2025-01-01T00:00:00Z", "evt_b");
        assert!(EventCursor::should_apply(Some(&prev), &peer));
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = cursor("2025-01-01T00:00:00Z", "evt_b");
        let b = cursor("2025-01-02T00:00:00Z", "evt_a");
        let c = cursor("2025-01-01T00:00:00Z", "evt_c");
        assert!(a < b);
        assert!(a < c);
        assert!(c < b);
    }
}
