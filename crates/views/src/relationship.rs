//! Relationship card views.
//!
//! A relationship review carries `(correct, high_confidence)` rather than a
//! four-way grade; it is mapped onto a synthetic grade and then reuses the
//! card schedule arithmetic keyed by the relationship card id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retain_events::{CardReviewedPayload, EventCursor, Grade, RelationshipReviewedPayload};

use crate::schedule::CardScheduleView;

/// Map a relationship review outcome onto a review grade.
pub fn synthetic_grade(correct: bool, high_confidence: bool) -> Grade {
    match (correct, high_confidence) {
        (false, _) => Grade::Again,
        (true, true) => Grade::Easy,
        (true, false) => Grade::Good,
    }
}

/// Per-relationship-card scheduling view: the card schedule plus the outcome
/// of the latest review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipScheduleView {
    #[serde(flatten)]
    pub schedule: CardScheduleView,
    pub last_correct: bool,
}

impl RelationshipScheduleView {
    pub fn apply_review(
        prev: Option<&RelationshipScheduleView>,
        payload: &RelationshipReviewedPayload,
        occurred_at: DateTime<Utc>,
        cursor: EventCursor,
        now: DateTime<Utc>,
    ) -> RelationshipScheduleView {
        let grade = synthetic_grade(payload.correct, payload.high_confidence);
        let as_review = CardReviewedPayload {
            grade,
            seconds_spent: payload.seconds_spent,
            rating_confidence: None,
        };

        RelationshipScheduleView {
            schedule: CardScheduleView::apply_review(
                prev.map(|p| &p.schedule),
                &as_review,
                occurred_at,
                cursor,
                now,
            ),
            last_correct: payload.correct,
        }
    }
}
