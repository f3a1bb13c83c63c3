//! Event-type → view routing table.

use retain_events::{EventKind, ViewCollection};

/// A view the projector may write for an event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ViewTarget {
    CardSchedule,
    CardPerformance,
    QuestionPerformance,
    RelationshipSchedule,
    RelationshipPerformance,
    MisconceptionEdge,
    ConceptCertification,
    Session,
    CardAnnotation,
}

impl ViewTarget {
    pub fn collection(&self) -> ViewCollection {
        match self {
            ViewTarget::CardSchedule => ViewCollection::CardSchedule,
            ViewTarget::CardPerformance => ViewCollection::CardPerf,
            ViewTarget::QuestionPerformance => ViewCollection::QuestionPerf,
            ViewTarget::RelationshipSchedule => ViewCollection::RelationshipSchedule,
            ViewTarget::RelationshipPerformance => ViewCollection::RelationshipPerf,
            ViewTarget::MisconceptionEdge => ViewCollection::MisconceptionEdge,
            ViewTarget::ConceptCertification => ViewCollection::ConceptCertification,
            ViewTarget::Session => ViewCollection::Session,
            ViewTarget::CardAnnotation => ViewCollection::CardAnnotation,
        }
    }

    pub fn name(&self) -> &'static str {
        self.collection().as_str()
    }
}

/// Views written per event type.
///
/// Known types without a projection (flags, interventions, certification
/// start, id-map migrations) return an empty set: the event is accepted and
/// stored, nothing is materialized for it here.
pub fn route(kind: EventKind) -> &'static [ViewTarget] {
    match kind {
        EventKind::CardReviewed => &[ViewTarget::CardSchedule, ViewTarget::CardPerformance],
        EventKind::QuestionAttempted => &[ViewTarget::QuestionPerformance],
        EventKind::RelationshipReviewed => &[
            ViewTarget::RelationshipSchedule,
            ViewTarget::RelationshipPerformance,
        ],
        EventKind::MisconceptionProbeResult => &[ViewTarget::MisconceptionEdge],
        EventKind::SessionStarted | EventKind::SessionEnded => &[ViewTarget::Session],
        EventKind::AccelerationApplied | EventKind::LapseApplied => &[ViewTarget::CardSchedule],
        EventKind::MasteryCertificationCompleted => &[ViewTarget::ConceptCertification],
        EventKind::CardAnnotationUpdated => &[ViewTarget::CardAnnotation],
        EventKind::MasteryCertificationStarted
        | EventKind::ContentFlagged
        | EventKind::InterventionAccepted
        | EventKind::InterventionRejected
        | EventKind::LibraryIdMapApplied => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_view_events_route_to_two_targets() {
        assert_eq!(
            route(EventKind::CardReviewed),
            &[ViewTarget::CardSchedule, ViewTarget::CardPerformance]
        );
        assert_eq!(route(EventKind::RelationshipReviewed).len(), 2);
    }

    #[test]
    fn interventions_route_to_the_schedule_only() {
        assert_eq!(route(EventKind::AccelerationApplied), &[ViewTarget::CardSchedule]);
        assert_eq!(route(EventKind::LapseApplied), &[ViewTarget::CardSchedule]);
    }

    #[test]
    fn unprojected_types_route_nowhere() {
        assert!(route(EventKind::ContentFlagged).is_empty());
        assert!(route(EventKind::MasteryCertificationStarted).is_empty());
        assert!(route(EventKind::LibraryIdMapApplied).is_empty());
    }
}
