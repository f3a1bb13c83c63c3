//! Session lifecycle view and end-of-session summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retain_events::{EventCursor, SessionEndedPayload, SessionStartedPayload};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

/// Per-session lifecycle view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_load: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cram_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_load: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatigue_hit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_accepted_intervention: Option<bool>,
    pub last_applied: EventCursor,
    pub updated_at: DateTime<Utc>,
}

impl SessionView {
    /// Initialize (or re-open) a session.
    pub fn apply_started(
        prev: Option<&SessionView>,
        payload: &SessionStartedPayload,
        occurred_at: DateTime<Utc>,
        cursor: EventCursor,
        now: DateTime<Utc>,
    ) -> SessionView {
        SessionView {
            status: SessionStatus::Active,
            started_at: Some(occurred_at),
            planned_load: Some(payload.planned_load),
            queue_size: Some(payload.queue_size),
            cram_mode: payload.cram_mode,
            // End-of-session fields carry over when a session re-opens.
            ended_at: prev.and_then(|p| p.ended_at),
            actual_load: prev.and_then(|p| p.actual_load),
            retention_delta: prev.and_then(|p| p.retention_delta),
            fatigue_hit: prev.and_then(|p| p.fatigue_hit),
            user_accepted_intervention: prev.and_then(|p| p.user_accepted_intervention),
            last_applied: cursor,
            updated_at: now,
        }
    }

    /// Complete a session.
    pub fn apply_ended(
        prev: Option<&SessionView>,
        payload: &SessionEndedPayload,
        occurred_at: DateTime<Utc>,
        cursor: EventCursor,
        now: DateTime<Utc>,
    ) -> SessionView {
        SessionView {
            status: SessionStatus::Completed,
            ended_at: Some(occurred_at),
            actual_load: Some(payload.actual_load),
            retention_delta: payload.retention_delta,
            fatigue_hit: payload.fatigue_hit,
            user_accepted_intervention: payload.user_accepted_intervention,
            started_at: prev.and_then(|p| p.started_at),
            planned_load: prev.and_then(|p| p.planned_load),
            queue_size: prev.and_then(|p| p.queue_size),
            cram_mode: prev.and_then(|p| p.cram_mode),
            last_applied: cursor,
            updated_at: now,
        }
    }
}

/// Aggregate totals for a finished session.
///
/// Declared in the summary schema but not populated by these reducers: the
/// per-event pipeline has no cross-event aggregation. Out-of-band jobs may
/// fill them in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub cards_reviewed: u32,
    pub questions_answered: u32,
    pub total_time_seconds: f64,
}

/// End-of-session summary, written alongside the session view when a
/// `session_ended` event is projected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub totals: SessionTotals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_load: Option<u32>,
    pub actual_load: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatigue_hit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_accepted_intervention: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    pub last_applied: EventCursor,
    pub updated_at: DateTime<Utc>,
}

impl SessionSummary {
    /// Build the summary for a completed session.
    pub fn from_session(
        session: &SessionView,
        payload: &SessionEndedPayload,
        occurred_at: DateTime<Utc>,
        cursor: EventCursor,
        now: DateTime<Utc>,
    ) -> SessionSummary {
        SessionSummary {
            totals: SessionTotals::default(),
            planned_load: session.planned_load,
            actual_load: payload.actual_load,
            load_delta: session
                .planned_load
                .map(|planned| i64::from(payload.actual_load) - i64::from(planned)),
            retention_delta: payload.retention_delta,
            fatigue_hit: payload.fatigue_hit,
            user_accepted_intervention: payload.user_accepted_intervention,
            started_at: session.started_at,
            ended_at: occurred_at,
            last_applied: cursor,
            updated_at: now,
        }
    }
}
