//! Card schedule view and its reducers.
//!
//! The arithmetic here is the replay contract: the grade multipliers, the
//! stability floor, the difficulty deltas and the state promotion thresholds
//! must not change, or historical events would replay into different views.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use retain_events::{
    AccelerationAppliedPayload, CardReviewedPayload, EventCursor, Grade, LapseAppliedPayload,
};

use crate::ReduceError;

/// Lowest stability a card can reach.
pub const MIN_STABILITY: f64 = 0.1;
/// Difficulty bounds.
pub const MIN_DIFFICULTY: f64 = 0.1;
pub const MAX_DIFFICULTY: f64 = 10.0;
/// Defaults for a card never reviewed before.
pub const DEFAULT_STABILITY: f64 = 1.0;
pub const DEFAULT_DIFFICULTY: f64 = 5.0;
/// Stability thresholds for state promotion.
const YOUNG_THRESHOLD: f64 = 7.0;
const MATURE_THRESHOLD: f64 = 90.0;

/// Scheduling state of a card: 0 new, 1 learning, 2 young, 3 mature.
pub const STATE_NEW: u8 = 0;
pub const STATE_LEARNING: u8 = 1;
pub const STATE_YOUNG: u8 = 2;
pub const STATE_MATURE: u8 = 3;

/// Per-card scheduling view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardScheduleView {
    pub state: u8,
    /// Fixed-width wire format: due-card scans compare this as a string.
    #[serde(with = "retain_events::timefmt")]
    pub due_at: DateTime<Utc>,
    pub stability: f64,
    pub difficulty: f64,
    pub interval_days: i64,
    pub last_reviewed_at: DateTime<Utc>,
    pub last_grade: Grade,
    pub last_applied: EventCursor,
    pub updated_at: DateTime<Utc>,
}

fn clamp_difficulty(d: f64) -> f64 {
    d.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn interval_from_stability(stability: f64) -> i64 {
    (stability.floor() as i64).max(1)
}

fn promote(state: u8, stability: f64, grade: Grade) -> u8 {
    if grade == Grade::Again {
        // A lapse never returns a card to "new".
        if state > STATE_NEW {
            (i16::from(state) - 1).max(1) as u8
        } else {
            STATE_NEW
        }
    } else {
        match state {
            STATE_NEW => STATE_LEARNING,
            STATE_LEARNING if stability > YOUNG_THRESHOLD => STATE_YOUNG,
            STATE_YOUNG if stability > MATURE_THRESHOLD => STATE_MATURE,
            other => other,
        }
    }
}

impl CardScheduleView {
    /// Reduce a card review into the schedule.
    ///
    /// `now` is sampled once by the projector; `occurred_at` is the client
    /// wall-clock of the review.
    pub fn apply_review(
        prev: Option<&CardScheduleView>,
        payload: &CardReviewedPayload,
        occurred_at: DateTime<Utc>,
        cursor: EventCursor,
        now: DateTime<Utc>,
    ) -> CardScheduleView {
        let (stability, difficulty, state) = match prev {
            Some(p) => (p.stability, p.difficulty, p.state),
            None => (DEFAULT_STABILITY, DEFAULT_DIFFICULTY, STATE_NEW),
        };

        let grade = payload.grade;
        let stability = (stability * grade.stability_multiplier()).max(MIN_STABILITY);
        let difficulty_delta = if grade == Grade::Again { 0.1 } else { -0.05 };
        let difficulty = clamp_difficulty(difficulty + difficulty_delta);
        let interval_days = interval_from_stability(stability);

        CardScheduleView {
            state: promote(state, stability, grade),
            due_at: now + Duration::days(interval_days),
            stability,
            difficulty,
            interval_days,
            last_reviewed_at: occurred_at,
            last_grade: grade,
            last_applied: cursor,
            updated_at: now,
        }
    }

    /// Reduce an out-of-loop stability boost. Requires a prior view; an
    /// intervention on a never-reviewed card indicates an upstream bug.
    pub fn apply_acceleration(
        prev: Option<&CardScheduleView>,
        payload: &AccelerationAppliedPayload,
        cursor: EventCursor,
        now: DateTime<Utc>,
    ) -> Result<CardScheduleView, ReduceError> {
        let prev = prev.ok_or(ReduceError::MissingPriorState)?;

        let stability = prev.stability * payload.acceleration_factor;
        let interval_days = interval_from_stability(stability);

        Ok(CardScheduleView {
            stability,
            interval_days,
            due_at: now + Duration::days(interval_days),
            last_applied: cursor,
            updated_at: now,
            // Not a review: grade, review time, difficulty and state carry over.
            state: prev.state,
            difficulty: prev.difficulty,
            last_reviewed_at: prev.last_reviewed_at,
            last_grade: prev.last_grade,
        })
    }

    /// Reduce an out-of-loop stability penalty. Requires a prior view.
    pub fn apply_lapse(
        prev: Option<&CardScheduleView>,
        payload: &LapseAppliedPayload,
        cursor: EventCursor,
        now: DateTime<Utc>,
    ) -> Result<CardScheduleView, ReduceError> {
        let prev = prev.ok_or(ReduceError::MissingPriorState)?;

        let stability = (prev.stability * payload.penalty_factor).max(MIN_STABILITY);
        let interval_days = interval_from_stability(stability);
        let state = if prev.state == STATE_YOUNG {
            STATE_MATURE
        } else {
            (i16::from(prev.state) - 1).max(1) as u8
        };

        Ok(CardScheduleView {
            state,
            stability,
            interval_days,
            due_at: now + Duration::days(interval_days),
            difficulty: (prev.difficulty + 0.1).min(MAX_DIFFICULTY),
            last_grade: Grade::Again,
            // An intervention, not a review.
            last_reviewed_at: prev.last_reviewed_at,
            last_applied: cursor,
            updated_at: now,
        })
    }
}
