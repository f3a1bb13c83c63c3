//! Materialized read models and their reducers.
//!
//! Every reducer is a pure function `(prev_view, event parts, cursor, now) →
//! next_view`: no I/O, deterministic modulo the single `now` sample taken by
//! the projector. Idempotence and reordering safety come from the
//! `last_applied` cursor checked before a reducer runs.

use thiserror::Error;

pub mod annotation;
pub mod certification;
pub mod misconception;
pub mod performance;
pub mod relationship;
pub mod schedule;
pub mod session;

pub use annotation::CardAnnotationView;
pub use certification::{CertificationAttempt, ConceptCertificationView};
pub use misconception::{
    MisconceptionEdgeView, MisconceptionEvidence, MisconceptionStatus,
};
pub use performance::PerformanceView;
pub use relationship::{synthetic_grade, RelationshipScheduleView};
pub use schedule::CardScheduleView;
pub use session::{SessionStatus, SessionSummary, SessionTotals, SessionView};

/// Reducer failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReduceError {
    /// A schedule-update reducer ran against an entity with no prior view.
    /// Interventions only make sense after at least one review; this
    /// indicates an upstream bug.
    #[error("no prior view state for schedule update")]
    MissingPriorState,
}
