//! Action helpers: build, validate and queue events for user actions.
//!
//! Each helper assigns the event id, stamps the device wall-clock, runs full
//! schema validation and hands the envelope to the engine's queue-and-try
//! path. The returned id can be used to track the entry in the queue.

use std::sync::Arc;

use chrono::Utc;

use retain_core::{
    CardId, ConceptId, DeviceId, EntityKind, EntityRef, EventId, MisconceptionEdgeId, OptionId,
    QuestionId, RelationshipCardId, SessionId,
};
use retain_events::{
    schema, AccelerationAppliedPayload, CardAnnotationUpdatedPayload, CardReviewedPayload,
    ContentFlaggedPayload, EventEnvelope, EventKind, EventPayload, FlagReason, Grade,
    InterventionAcceptedPayload, InterventionRejectedPayload, LapseAppliedPayload,
    LibraryIdMapAppliedPayload, MasteryCertificationCompletedPayload,
    MasteryCertificationStartedPayload, MisconceptionProbeResultPayload,
    QuestionAttemptedPayload, RelationshipReviewedPayload, SessionEndedPayload,
    SessionStartedPayload, SCHEMA_VERSION,
};

use crate::engine::SyncEngine;
use crate::SyncError;

/// User-facing entry point: one instance per `(engine, device)`.
pub struct ClientApi {
    engine: Arc<SyncEngine>,
    device_id: DeviceId,
}

impl ClientApi {
    pub fn new(engine: Arc<SyncEngine>, device_id: DeviceId) -> Self {
        Self { engine, device_id }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    async fn submit(
        &self,
        kind: EventKind,
        entity: EntityRef,
        payload: EventPayload,
    ) -> Result<EventId, SyncError> {
        let now = Utc::now();
        let envelope = EventEnvelope {
            event_id: EventId::new(),
            event_type: kind.as_str().to_string(),
            user_id: self.engine.user_id().clone(),
            library_id: self.engine.library_id().clone(),
            occurred_at: now,
            // Provisional; ingestion re-stamps on acknowledgement.
            received_at: now,
            device_id: self.device_id.clone(),
            entity,
            payload: payload.to_value()?,
            schema_version: SCHEMA_VERSION.to_string(),
        };

        // Full validation before anything touches the queue: a malformed
        // action is a local bug and must fail loudly here.
        let raw = serde_json::to_value(&envelope)
            .map_err(|e| SyncError::Validation(retain_core::DomainError::validation(
                format!("event serialization failed: {e}"),
            )))?;
        let (envelope, _) = schema::validate(&raw)?;

        self.engine.enqueue_validated(envelope).await
    }

    pub async fn review_card(
        &self,
        card_id: &CardId,
        grade: Grade,
        seconds_spent: f64,
        rating_confidence: Option<u8>,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::CardReviewed,
            EntityRef::new(EntityKind::Card, card_id.as_str()),
            EventPayload::CardReviewed(CardReviewedPayload {
                grade,
                seconds_spent,
                rating_confidence,
            }),
        )
        .await
    }

    pub async fn attempt_question(
        &self,
        question_id: &QuestionId,
        selected_option_id: &OptionId,
        correct: bool,
        seconds_spent: f64,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::QuestionAttempted,
            EntityRef::new(EntityKind::Question, question_id.as_str()),
            EventPayload::QuestionAttempted(QuestionAttemptedPayload {
                selected_option_id: selected_option_id.clone(),
                correct,
                seconds_spent,
            }),
        )
        .await
    }

    pub async fn review_relationship(
        &self,
        relationship_card_id: &RelationshipCardId,
        payload: RelationshipReviewedPayload,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::RelationshipReviewed,
            EntityRef::new(EntityKind::RelationshipCard, relationship_card_id.as_str()),
            EventPayload::RelationshipReviewed(payload),
        )
        .await
    }

    pub async fn probe_misconception(
        &self,
        edge_id: &MisconceptionEdgeId,
        payload: MisconceptionProbeResultPayload,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::MisconceptionProbeResult,
            EntityRef::new(EntityKind::MisconceptionEdge, edge_id.as_str()),
            EventPayload::MisconceptionProbeResult(payload),
        )
        .await
    }

    pub async fn start_session(
        &self,
        session_id: &SessionId,
        payload: SessionStartedPayload,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::SessionStarted,
            EntityRef::new(EntityKind::Session, session_id.as_str()),
            EventPayload::SessionStarted(payload),
        )
        .await
    }

    pub async fn end_session(
        &self,
        session_id: &SessionId,
        payload: SessionEndedPayload,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::SessionEnded,
            EntityRef::new(EntityKind::Session, session_id.as_str()),
            EventPayload::SessionEnded(payload),
        )
        .await
    }

    pub async fn apply_acceleration(
        &self,
        card_id: &CardId,
        acceleration_factor: f64,
        trigger: impl Into<String>,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::AccelerationApplied,
            EntityRef::new(EntityKind::Card, card_id.as_str()),
            EventPayload::AccelerationApplied(AccelerationAppliedPayload {
                acceleration_factor,
                trigger: trigger.into(),
            }),
        )
        .await
    }

    pub async fn apply_lapse(
        &self,
        card_id: &CardId,
        penalty_factor: f64,
        trigger: impl Into<String>,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::LapseApplied,
            EntityRef::new(EntityKind::Card, card_id.as_str()),
            EventPayload::LapseApplied(LapseAppliedPayload {
                penalty_factor,
                trigger: trigger.into(),
            }),
        )
        .await
    }

    pub async fn start_certification(
        &self,
        concept_id: &ConceptId,
        target_type: Option<String>,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::MasteryCertificationStarted,
            EntityRef::new(EntityKind::Concept, concept_id.as_str()),
            EventPayload::MasteryCertificationStarted(MasteryCertificationStartedPayload {
                target_type,
            }),
        )
        .await
    }

    pub async fn complete_certification(
        &self,
        concept_id: &ConceptId,
        payload: MasteryCertificationCompletedPayload,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::MasteryCertificationCompleted,
            EntityRef::new(EntityKind::Concept, concept_id.as_str()),
            EventPayload::MasteryCertificationCompleted(payload),
        )
        .await
    }

    pub async fn annotate_card(
        &self,
        card_id: &CardId,
        payload: CardAnnotationUpdatedPayload,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::CardAnnotationUpdated,
            EntityRef::new(EntityKind::Card, card_id.as_str()),
            EventPayload::CardAnnotationUpdated(payload),
        )
        .await
    }

    pub async fn flag_content(
        &self,
        entity: EntityRef,
        reason: FlagReason,
        comment: Option<String>,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::ContentFlagged,
            entity,
            EventPayload::ContentFlagged(ContentFlaggedPayload { reason, comment }),
        )
        .await
    }

    pub async fn accept_intervention(
        &self,
        entity: EntityRef,
        intervention_type: impl Into<String>,
        factor: Option<f64>,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::InterventionAccepted,
            entity,
            EventPayload::InterventionAccepted(InterventionAcceptedPayload {
                intervention_type: intervention_type.into(),
                factor,
            }),
        )
        .await
    }

    pub async fn reject_intervention(
        &self,
        entity: EntityRef,
        intervention_type: impl Into<String>,
        reason: Option<String>,
    ) -> Result<EventId, SyncError> {
        self.submit(
            EventKind::InterventionRejected,
            entity,
            EventPayload::InterventionRejected(InterventionRejectedPayload {
                intervention_type: intervention_type.into(),
                reason,
            }),
        )
        .await
    }

    pub async fn apply_library_id_map(
        &self,
        payload: LibraryIdMapAppliedPayload,
    ) -> Result<EventId, SyncError> {
        let entity = EntityRef::new(
            EntityKind::LibraryVersion,
            self.engine.library_id().as_str(),
        );
        self.submit(
            EventKind::LibraryIdMapApplied,
            entity,
            EventPayload::LibraryIdMapApplied(payload),
        )
        .await
    }
}
