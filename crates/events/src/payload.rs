//! Typed event payloads.
//!
//! The wire shape is a discriminated union keyed by the envelope's `type`
//! field; the payload object itself carries no discriminant. Decoding is
//! therefore a two-step affair: look the kind up in [`EventKind`], then
//! deserialize the payload object into the matching variant.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use retain_core::{ConceptId, DomainError, EntityKind, OptionId};

/// Review grade for a card.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Again,
    Hard,
    Good,
    Easy,
}

impl Grade {
    /// Stability multiplier applied by the schedule reducer.
    ///
    /// These constants are part of the replay contract; changing them changes
    /// the meaning of every historical event.
    pub fn stability_multiplier(&self) -> f64 {
        match self {
            Grade::Again => 0.5,
            Grade::Hard => 0.8,
            Grade::Good => 1.2,
            Grade::Easy => 1.5,
        }
    }

    /// A review counts as correct unless graded `again`.
    pub fn is_correct(&self) -> bool {
        !matches!(self, Grade::Again)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Again => "again",
            Grade::Hard => "hard",
            Grade::Good => "good",
            Grade::Easy => "easy",
        }
    }
}

/// Quality of a free-form explanation given during a probe.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationQuality {
    Good,
    Weak,
}

/// Outcome of a mastery certification run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificationResult {
    Full,
    Partial,
    None,
}

/// What a card annotation update did.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationAction {
    Added,
    Removed,
    Updated,
}

/// Why a piece of content was flagged.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    Incorrect,
    Confusing,
    Outdated,
    PoorlyWorded,
}

/// Directed pair of concept endpoints for a relationship review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Direction {
    pub from: ConceptId,
    pub to: ConceptId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardReviewedPayload {
    pub grade: Grade,
    pub seconds_spent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_confidence: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuestionAttemptedPayload {
    pub selected_option_id: OptionId,
    pub correct: bool,
    pub seconds_spent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipReviewedPayload {
    pub concept_a_id: ConceptId,
    pub concept_b_id: ConceptId,
    pub direction: Direction,
    pub correct: bool,
    pub high_confidence: bool,
    pub seconds_spent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MisconceptionProbeResultPayload {
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_quality: Option<ExplanationQuality>,
    pub seconds_spent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionStartedPayload {
    pub planned_load: u32,
    pub queue_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cram_mode: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionEndedPayload {
    pub actual_load: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatigue_hit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_accepted_intervention: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccelerationAppliedPayload {
    pub acceleration_factor: f64,
    pub trigger: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LapseAppliedPayload {
    pub penalty_factor: f64,
    pub trigger: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasteryCertificationStartedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasteryCertificationCompletedPayload {
    pub certification_result: CertificationResult,
    pub questions_answered: u32,
    pub correct_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_quality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardAnnotationUpdatedPayload {
    pub action: AnnotationAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentFlaggedPayload {
    pub reason: FlagReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterventionAcceptedPayload {
    pub intervention_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterventionRejectedPayload {
    pub intervention_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One identifier rename in a library version migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdRename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdRenames {
    #[serde(default)]
    pub cards: Vec<IdRename>,
    #[serde(default)]
    pub questions: Vec<IdRename>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryIdMapAppliedPayload {
    pub from_version: String,
    pub to_version: String,
    pub renames: IdRenames,
}

/// The set of event types this pipeline understands.
///
/// Ingestion accepts envelopes with types outside this set (forward
/// compatibility); the projector downgrades them to a logged no-op.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    CardReviewed,
    QuestionAttempted,
    RelationshipReviewed,
    MisconceptionProbeResult,
    SessionStarted,
    SessionEnded,
    AccelerationApplied,
    LapseApplied,
    MasteryCertificationStarted,
    MasteryCertificationCompleted,
    CardAnnotationUpdated,
    ContentFlagged,
    InterventionAccepted,
    InterventionRejected,
    LibraryIdMapApplied,
}

impl EventKind {
    pub const ALL: &'static [EventKind] = &[
        EventKind::CardReviewed,
        EventKind::QuestionAttempted,
        EventKind::RelationshipReviewed,
        EventKind::MisconceptionProbeResult,
        EventKind::SessionStarted,
        EventKind::SessionEnded,
        EventKind::AccelerationApplied,
        EventKind::LapseApplied,
        EventKind::MasteryCertificationStarted,
        EventKind::MasteryCertificationCompleted,
        EventKind::CardAnnotationUpdated,
        EventKind::ContentFlagged,
        EventKind::InterventionAccepted,
        EventKind::InterventionRejected,
        EventKind::LibraryIdMapApplied,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CardReviewed => "card_reviewed",
            EventKind::QuestionAttempted => "question_attempted",
            EventKind::RelationshipReviewed => "relationship_reviewed",
            EventKind::MisconceptionProbeResult => "misconception_probe_result",
            EventKind::SessionStarted => "session_started",
            EventKind::SessionEnded => "session_ended",
            EventKind::AccelerationApplied => "acceleration_applied",
            EventKind::LapseApplied => "lapse_applied",
            EventKind::MasteryCertificationStarted => "mastery_certification_started",
            EventKind::MasteryCertificationCompleted => "mastery_certification_completed",
            EventKind::CardAnnotationUpdated => "card_annotation_updated",
            EventKind::ContentFlagged => "content_flagged",
            EventKind::InterventionAccepted => "intervention_accepted",
            EventKind::InterventionRejected => "intervention_rejected",
            EventKind::LibraryIdMapApplied => "library_id_map_applied",
        }
    }

    /// Resolve a wire `type` string; `None` for unknown types.
    pub fn lookup(s: &str) -> Option<EventKind> {
        Self::ALL.iter().copied().find(|k| k.as_str() == s)
    }

    /// Entity kinds an event of this type may refer to.
    pub fn allowed_entity_kinds(&self) -> &'static [EntityKind] {
        match self {
            EventKind::CardReviewed
            | EventKind::AccelerationApplied
            | EventKind::LapseApplied
            | EventKind::CardAnnotationUpdated => &[EntityKind::Card],
            EventKind::QuestionAttempted => &[EntityKind::Question],
            EventKind::RelationshipReviewed => &[EntityKind::RelationshipCard],
            EventKind::MisconceptionProbeResult => &[EntityKind::MisconceptionEdge],
            EventKind::SessionStarted | EventKind::SessionEnded => &[EntityKind::Session],
            EventKind::MasteryCertificationStarted | EventKind::MasteryCertificationCompleted => {
                &[EntityKind::Concept]
            }
            EventKind::ContentFlagged => &[
                EntityKind::Card,
                EntityKind::Question,
                EntityKind::RelationshipCard,
            ],
            EventKind::InterventionAccepted | EventKind::InterventionRejected => &[
                EntityKind::Card,
                EntityKind::RelationshipCard,
                EntityKind::Concept,
            ],
            EventKind::LibraryIdMapApplied => &[EntityKind::LibraryVersion],
        }
    }

    pub fn allows_entity(&self, kind: EntityKind) -> bool {
        self.allowed_entity_kinds().contains(&kind)
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully decoded payload, one variant per known event type.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    CardReviewed(CardReviewedPayload),
    QuestionAttempted(QuestionAttemptedPayload),
    RelationshipReviewed(RelationshipReviewedPayload),
    MisconceptionProbeResult(MisconceptionProbeResultPayload),
    SessionStarted(SessionStartedPayload),
    SessionEnded(SessionEndedPayload),
    AccelerationApplied(AccelerationAppliedPayload),
    LapseApplied(LapseAppliedPayload),
    MasteryCertificationStarted(MasteryCertificationStartedPayload),
    MasteryCertificationCompleted(MasteryCertificationCompletedPayload),
    CardAnnotationUpdated(CardAnnotationUpdatedPayload),
    ContentFlagged(ContentFlaggedPayload),
    InterventionAccepted(InterventionAcceptedPayload),
    InterventionRejected(InterventionRejectedPayload),
    LibraryIdMapApplied(LibraryIdMapAppliedPayload),
}

fn decode<T: serde::de::DeserializeOwned>(
    kind: EventKind,
    value: &JsonValue,
) -> Result<T, DomainError> {
    serde_json::from_value(value.clone())
        .map_err(|e| DomainError::validation(format!("{kind} payload: {e}")))
}

fn require_non_negative_seconds(kind: EventKind, seconds: f64) -> Result<(), DomainError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(DomainError::validation(format!(
            "{kind} payload: seconds_spent must be a finite value >= 0, got {seconds}"
        )));
    }
    Ok(())
}

impl EventPayload {
    /// Decode and validate a raw payload object for a known event type.
    pub fn decode(kind: EventKind, value: &JsonValue) -> Result<EventPayload, DomainError> {
        if !value.is_object() {
            return Err(DomainError::validation(format!(
                "{kind} payload must be an object"
            )));
        }

        let payload = match kind {
            EventKind::CardReviewed => {
                let p: CardReviewedPayload = decode(kind, value)?;
                require_non_negative_seconds(kind, p.seconds_spent)?;
                if let Some(c) = p.rating_confidence {
                    if c > 3 {
                        return Err(DomainError::validation(format!(
                            "{kind} payload: rating_confidence must be within 0..=3, got {c}"
                        )));
                    }
                }
                EventPayload::CardReviewed(p)
            }
            EventKind::QuestionAttempted => {
                let p: QuestionAttemptedPayload = decode(kind, value)?;
                require_non_negative_seconds(kind, p.seconds_spent)?;
                EventPayload::QuestionAttempted(p)
            }
            EventKind::RelationshipReviewed => {
                let p: RelationshipReviewedPayload = decode(kind, value)?;
                require_non_negative_seconds(kind, p.seconds_spent)?;
                if p.concept_a_id == p.concept_b_id {
                    return Err(DomainError::validation(format!(
                        "{kind} payload: concept endpoints must be distinct"
                    )));
                }
                if p.direction.from == p.direction.to {
                    return Err(DomainError::validation(format!(
                        "{kind} payload: direction endpoints must be distinct"
                    )));
                }
                let endpoints = [&p.concept_a_id, &p.concept_b_id];
                if !endpoints.contains(&&p.direction.from) || !endpoints.contains(&&p.direction.to)
                {
                    return Err(DomainError::validation(format!(
                        "{kind} payload: direction must connect the two concept endpoints"
                    )));
                }
                EventPayload::RelationshipReviewed(p)
            }
            EventKind::MisconceptionProbeResult => {
                let p: MisconceptionProbeResultPayload = decode(kind, value)?;
                require_non_negative_seconds(kind, p.seconds_spent)?;
                EventPayload::MisconceptionProbeResult(p)
            }
            EventKind::SessionStarted => {
                EventPayload::SessionStarted(decode(kind, value)?)
            }
            EventKind::SessionEnded => EventPayload::SessionEnded(decode(kind, value)?),
            EventKind::AccelerationApplied => {
                let p: AccelerationAppliedPayload = decode(kind, value)?;
                if !p.acceleration_factor.is_finite() || p.acceleration_factor < 1.0 {
                    return Err(DomainError::validation(format!(
                        "{kind} payload: acceleration_factor must be >= 1.0, got {}",
                        p.acceleration_factor
                    )));
                }
                EventPayload::AccelerationApplied(p)
            }
            EventKind::LapseApplied => {
                let p: LapseAppliedPayload = decode(kind, value)?;
                if !p.penalty_factor.is_finite() || !(0.0..=1.0).contains(&p.penalty_factor) {
                    return Err(DomainError::validation(format!(
                        "{kind} payload: penalty_factor must be within [0, 1], got {}",
                        p.penalty_factor
                    )));
                }
                EventPayload::LapseApplied(p)
            }
            EventKind::MasteryCertificationStarted => {
                EventPayload::MasteryCertificationStarted(decode(kind, value)?)
            }
            EventKind::MasteryCertificationCompleted => {
                let p: MasteryCertificationCompletedPayload = decode(kind, value)?;
                if p.correct_count > p.questions_answered {
                    return Err(DomainError::validation(format!(
                        "{kind} payload: correct_count ({}) exceeds questions_answered ({})",
                        p.correct_count, p.questions_answered
                    )));
                }
                EventPayload::MasteryCertificationCompleted(p)
            }
            EventKind::CardAnnotationUpdated => {
                EventPayload::CardAnnotationUpdated(decode(kind, value)?)
            }
            EventKind::ContentFlagged => EventPayload::ContentFlagged(decode(kind, value)?),
            EventKind::InterventionAccepted => {
                EventPayload::InterventionAccepted(decode(kind, value)?)
            }
            EventKind::InterventionRejected => {
                EventPayload::InterventionRejected(decode(kind, value)?)
            }
            EventKind::LibraryIdMapApplied => {
                EventPayload::LibraryIdMapApplied(decode(kind, value)?)
            }
        };

        Ok(payload)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::CardReviewed(_) => EventKind::CardReviewed,
            EventPayload::QuestionAttempted(_) => EventKind::QuestionAttempted,
            EventPayload::RelationshipReviewed(_) => EventKind::RelationshipReviewed,
            EventPayload::MisconceptionProbeResult(_) => EventKind::MisconceptionProbeResult,
            EventPayload::SessionStarted(_) => EventKind::SessionStarted,
            EventPayload::SessionEnded(_) => EventKind::SessionEnded,
            EventPayload::AccelerationApplied(_) => EventKind::AccelerationApplied,
            EventPayload::LapseApplied(_) => EventKind::LapseApplied,
            EventPayload::MasteryCertificationStarted(_) => EventKind::MasteryCertificationStarted,
            EventPayload::MasteryCertificationCompleted(_) => {
                EventKind::MasteryCertificationCompleted
            }
            EventPayload::CardAnnotationUpdated(_) => EventKind::CardAnnotationUpdated,
            EventPayload::ContentFlagged(_) => EventKind::ContentFlagged,
            EventPayload::InterventionAccepted(_) => EventKind::InterventionAccepted,
            EventPayload::InterventionRejected(_) => EventKind::InterventionRejected,
            EventPayload::LibraryIdMapApplied(_) => EventKind::LibraryIdMapApplied,
        }
    }

    /// Serialize back into the wire payload object.
    pub fn to_value(&self) -> Result<JsonValue, DomainError> {
        let result = match self {
            EventPayload::CardReviewed(p) => serde_json::to_value(p),
            EventPayload::QuestionAttempted(p) => serde_json::to_value(p),
            EventPayload::RelationshipReviewed(p) => serde_json::to_value(p),
            EventPayload::MisconceptionProbeResult(p) => serde_json::to_value(p),
            EventPayload::SessionStarted(p) => serde_json::to_value(p),
            EventPayload::SessionEnded(p) => serde_json::to_value(p),
            EventPayload::AccelerationApplied(p) => serde_json::to_value(p),
            EventPayload::LapseApplied(p) => serde_json::to_value(p),
            EventPayload::MasteryCertificationStarted(p) => serde_json::to_value(p),
            EventPayload::MasteryCertificationCompleted(p) => serde_json::to_value(p),
            EventPayload::CardAnnotationUpdated(p) => serde_json::to_value(p),
            EventPayload::ContentFlagged(p) => serde_json::to_value(p),
            EventPayload::InterventionAccepted(p) => serde_json::to_value(p),
            EventPayload::InterventionRejected(p) => serde_json::to_value(p),
            EventPayload::LibraryIdMapApplied(p) => serde_json::to_value(p),
        };
        result.map_err(|e| DomainError::validation(format!("payload serialization failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn grade_multipliers_are_fixed() {
        assert_eq!(Grade::Again.stability_multiplier(), 0.5);
        assert_eq!(Grade::Hard.stability_multiplier(), 0.8);
        assert_eq!(Grade::Good.stability_multiplier(), 1.2);
        assert_eq!(Grade::Easy.stability_multiplier(), 1.5);
    }

    #[test]
    fn decodes_card_reviewed() {
        let value = json!({"grade": "good", "seconds_spent": 18.0});
        let payload = EventPayload::decode(EventKind::CardReviewed, &value).unwrap();
        match payload {
            EventPayload::CardReviewed(p) => {
                assert_eq!(p.grade, Grade::Good);
                assert_eq!(p.seconds_spent, 18.0);
                assert!(p.rating_confidence.is_none());
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn rejects_negative_seconds() {
        let value = json!({"grade": "good", "seconds_spent": -1.0});
        assert!(EventPayload::decode(EventKind::CardReviewed, &value).is_err());
    }

    #[test]
    fn rejects_unknown_payload_fields() {
        let value = json!({"grade": "good", "seconds_spent": 3.0, "streak": 4});
        assert!(EventPayload::decode(EventKind::CardReviewed, &value).is_err());
    }

    #[test]
    fn rejects_identical_relationship_endpoints() {
        let value = json!({
            "concept_a_id": "concept_a",
            "concept_b_id": "concept_a",
            "direction": {"from": "concept_a", "to": "concept_b"},
            "correct": true,
            "high_confidence": false,
            "seconds_spent": 4.0
        });
        assert!(EventPayload::decode(EventKind::RelationshipReviewed, &value).is_err());
    }

    #[test]
    fn rejects_direction_outside_endpoints() {
        let value = json!({
            "concept_a_id": "concept_a",
            "concept_b_id": "concept_b",
            "direction": {"from": "concept_a", "to": "concept_x"},
            "correct": true,
            "high_confidence": false,
            "seconds_spent": 4.0
        });
        assert!(EventPayload::decode(EventKind::RelationshipReviewed, &value).is_err());
    }

    #[test]
    fn rejects_correct_count_above_answered() {
        let value = json!({
            "certification_result": "partial",
            "questions_answered": 4,
            "correct_count": 5
        });
        assert!(EventPayload::decode(EventKind::MasteryCertificationCompleted, &value).is_err());
    }

    #[test]
    fn rejects_out_of_range_penalty() {
        let value = json!({"penalty_factor": 1.5, "trigger": "probe"});
        assert!(EventPayload::decode(EventKind::LapseApplied, &value).is_err());
    }

    #[test]
    fn unknown_type_has_no_kind() {
        assert!(EventKind::lookup("card_reviewed").is_some());
        assert!(EventKind::lookup("card_reviewed_v2").is_none());
    }

    #[test]
    fn entity_kind_constraints() {
        assert!(EventKind::CardReviewed.allows_entity(EntityKind::Card));
        assert!(!EventKind::CardReviewed.allows_entity(EntityKind::Question));
        assert!(EventKind::ContentFlagged.allows_entity(EntityKind::Question));
        assert!(!EventKind::ContentFlagged.allows_entity(EntityKind::Concept));
    }
}
