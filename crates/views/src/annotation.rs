//! Card annotation view.
//!
//! Tags behave as a set: equality ignores order, but insertion order of the
//! first observation is preserved for display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retain_events::{AnnotationAction, CardAnnotationUpdatedPayload, EventCursor};

/// Per-card annotation view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardAnnotationView {
    pub tags: Vec<String>,
    pub pinned: bool,
    pub last_updated_at: DateTime<Utc>,
    pub last_applied: EventCursor,
    pub updated_at: DateTime<Utc>,
}

fn union_preserving_order(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = existing.to_vec();
    for tag in incoming {
        if !merged.iter().any(|t| t == tag) {
            merged.push(tag.clone());
        }
    }
    merged
}

fn subtract(existing: &[String], removed: &[String]) -> Vec<String> {
    existing
        .iter()
        .filter(|t| !removed.iter().any(|r| r == *t))
        .cloned()
        .collect()
}

impl CardAnnotationView {
    /// Fold one annotation update into the view.
    pub fn apply_update(
        prev: Option<&CardAnnotationView>,
        payload: &CardAnnotationUpdatedPayload,
        occurred_at: DateTime<Utc>,
        cursor: EventCursor,
        now: DateTime<Utc>,
    ) -> CardAnnotationView {
        let (prev_tags, prev_pinned) = match prev {
            Some(p) => (p.tags.clone(), p.pinned),
            None => (Vec::new(), false),
        };
        let incoming = payload.tags.as_deref().unwrap_or(&[]);

        let (tags, pinned) = match payload.action {
            AnnotationAction::Added => (
                union_preserving_order(&prev_tags, incoming),
                payload.pinned.unwrap_or(prev_pinned),
            ),
            AnnotationAction::Removed => (
                subtract(&prev_tags, incoming),
                // Pin survives a removal unless explicitly cleared.
                if payload.pinned == Some(false) {
                    false
                } else {
                    prev_pinned
                },
            ),
            AnnotationAction::Updated => (
                payload.tags.clone().unwrap_or(prev_tags),
                payload.pinned.unwrap_or(prev_pinned),
            ),
        };

        CardAnnotationView {
            tags,
            pinned,
            last_updated_at: occurred_at,
            last_applied: cursor,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retain_core::EventId;

    fn cursor(ts: &str, id: &str) -> EventCursor {
        EventCursor::new(ts.parse().unwrap(), EventId::parse(id).unwrap())
    }

    fn t(ts: &str) -> DateTime<Utc> {
        ts.parse().unwrap()
    }

    fn update(
        action: AnnotationAction,
        tags: Option<&[&str]>,
        pinned: Option<bool>,
    ) -> CardAnnotationUpdatedPayload {
        CardAnnotationUpdatedPayload {
            action,
            tags: tags.map(|t| t.iter().map(|s| s.to_string()).collect()),
            pinned,
        }
    }

    fn apply(
        prev: Option<&CardAnnotationView>,
        payload: &CardAnnotationUpdatedPayload,
        id: &str,
    ) -> CardAnnotationView {
        CardAnnotationView::apply_update(
            prev,
            payload,
            t("2025-01-01T00:00:00Z"),
            cursor("2025-01-01T00:00:00Z", id),
            t("2025-01-01T00:00:00Z"),
        )
    }

    #[test]
    fn added_merges_tags_preserving_first_observation_order() {
        let first = apply(
            None,
            &update(AnnotationAction::Added, Some(&["anatomy", "exam"]), None),
            "evt_a",
        );
        let second = apply(
            Some(&first),
            &update(AnnotationAction::Added, Some(&["exam", "hard"]), Some(true)),
            "evt_b",
        );

        assert_eq!(second.tags, vec!["anatomy", "exam", "hard"]);
        assert!(second.pinned);
    }

    #[test]
    fn removed_subtracts_tags_and_keeps_pin() {
        let first = apply(
            None,
            &update(
                AnnotationAction::Added,
                Some(&["anatomy", "exam"]),
                Some(true),
            ),
            "evt_a",
        );
        let second = apply(
            Some(&first),
            &update(AnnotationAction::Removed, Some(&["exam"]), None),
            "evt_b",
        );

        assert_eq!(second.tags, vec!["anatomy"]);
        assert!(second.pinned);

        let third = apply(
            Some(&second),
            &update(AnnotationAction::Removed, None, Some(false)),
            "evt_c",
        );
        assert!(!third.pinned);
    }

    #[test]
    fn updated_replaces_provided_fields() {
        let first = apply(
            None,
            &update(
                AnnotationAction::Added,
                Some(&["anatomy", "exam"]),
                Some(true),
            ),
            "evt_a",
        );
        let second = apply(
            Some(&first),
            &update(AnnotationAction::Updated, Some(&["review"]), None),
            "evt_b",
        );

        assert_eq!(second.tags, vec!["review"]);
        // Pinned not provided: previous value stands.
        assert!(second.pinned);
    }

    #[test]
    fn duplicate_adds_do_not_duplicate_tags() {
        let first = apply(
            None,
            &update(AnnotationAction::Added, Some(&["anatomy"]), None),
            "evt_a",
        );
        let second = apply(
            Some(&first),
            &update(AnnotationAction::Added, Some(&["anatomy"]), None),
            "evt_b",
        );
        assert_eq!(second.tags, vec!["anatomy"]);
    }
}
