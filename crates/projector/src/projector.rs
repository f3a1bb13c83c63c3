//! Per-event projection.
//!
//! For each event the projector resolves its reducers from the routing
//! table, reads the affected views, applies the idempotency cursor, and
//! writes the reduced views back — all inside one store transaction, so a
//! multi-view event is never observable half-applied.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use retain_core::{Clock, DomainError, LibraryId, SessionId, SystemClock, UserId};
use retain_events::{path, schema, EventCursor, EventEnvelope, EventPayload};
use retain_store::{CollectionQuery, DocumentStore, StoreError};
use retain_views::{
    CardAnnotationView, CardScheduleView, ConceptCertificationView, MisconceptionEdgeView,
    PerformanceView, ReduceError, RelationshipScheduleView, SessionSummary, SessionView,
};

use crate::router::{route, ViewTarget};

/// Page size used by [`Projector::replay_library`].
const REPLAY_PAGE_SIZE: usize = 100;

/// Outcome of projecting one event into one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewReport {
    pub view: &'static str,
    pub updated: bool,
    pub idempotent: bool,
}

impl ViewReport {
    fn updated(view: &'static str) -> Self {
        Self {
            view,
            updated: true,
            idempotent: false,
        }
    }

    fn skipped(view: &'static str) -> Self {
        Self {
            view,
            updated: false,
            idempotent: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProjectorError {
    /// Payload failed its type schema. Terminal for the event.
    #[error("invalid payload: {0}")]
    InvalidPayload(DomainError),

    /// `entity.kind` is incompatible with the event type. Terminal.
    #[error("entity kind mismatch: event type '{event_type}' does not apply to entity kind '{entity_kind}'")]
    EntityKindMismatch {
        event_type: String,
        entity_kind: String,
    },

    /// A reducer precondition failed (e.g. schedule update with no prior
    /// view). Terminal for the event.
    #[error(transparent)]
    Reduce(#[from] ReduceError),

    /// A stored view document no longer matches its schema.
    #[error("malformed view document at '{path}': {message}")]
    CorruptView { path: String, message: String },

    /// Transient store failure; re-delivery is safe.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Summary of a full event replay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub events: usize,
    pub views_updated: usize,
    pub views_skipped: usize,
    pub unknown_types: usize,
}

/// Applies events to materialized views.
pub struct Projector<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: DocumentStore> Projector<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Project one event into its views.
    ///
    /// Safe to call for events already projected (the cursor skips them) and
    /// for events delivered out of order (stale events become no-ops).
    pub async fn project(&self, event: &EventEnvelope) -> Result<Vec<ViewReport>, ProjectorError> {
        let Some(kind) = event.kind() else {
            tracing::warn!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                "unknown event type; skipping projection"
            );
            return Ok(Vec::new());
        };

        if !kind.allows_entity(event.entity.kind) {
            return Err(ProjectorError::EntityKindMismatch {
                event_type: event.event_type.clone(),
                entity_kind: event.entity.kind.as_str().to_string(),
            });
        }

        let payload = event
            .typed_payload()
            .map_err(ProjectorError::InvalidPayload)?;

        let targets = route(kind);
        if targets.is_empty() {
            tracing::debug!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                "event type has no projection"
            );
            return Ok(Vec::new());
        }

        let paths: Vec<String> = targets
            .iter()
            .map(|t| {
                path::view_path(
                    &event.user_id,
                    &event.library_id,
                    t.collection(),
                    &event.entity.id,
                )
            })
            .collect();

        let now = self.clock.now();
        let cursor = event.cursor();

        // The transaction body may rerun on conflict; outputs are captured
        // through this slot and reset at the top of every attempt.
        let outcome: Arc<Mutex<Result<Vec<ViewReport>, ProjectorError>>> =
            Arc::new(Mutex::new(Ok(Vec::new())));
        let body_outcome = outcome.clone();

        let txn_result = self
            .store
            .transaction(
                paths.clone(),
                Box::new(move |docs| {
                    match project_into_docs(event, &payload, targets, &paths, docs, &cursor, now) {
                        Ok((writes, reports)) => {
                            *lock_outcome(&body_outcome) = Ok(reports);
                            Ok(writes)
                        }
                        Err(err) => {
                            let message = err.to_string();
                            *lock_outcome(&body_outcome) = Err(err);
                            Err(StoreError::InvalidRequest(message))
                        }
                    }
                }),
            )
            .await;

        let reports = std::mem::replace(&mut *lock_outcome(&outcome), Ok(Vec::new()));
        match (txn_result, reports) {
            // A projection error aborted the transaction: surface it rather
            // than the store's wrapper error.
            (_, Err(projection_err)) => Err(projection_err),
            (Err(store_err), Ok(_)) => Err(store_err.into()),
            (Ok(_), Ok(reports)) => Ok(reports),
        }
    }

    /// Replay every event of a library in `(received_at, event_id)` order.
    ///
    /// Idempotent catch-up: views already ahead of an event skip it, so a
    /// replay converges to the same state as in-order delivery.
    pub async fn replay_library(
        &self,
        user_id: &UserId,
        library_id: &LibraryId,
    ) -> Result<ReplayReport, ProjectorError> {
        let collection = path::events_collection(user_id, library_id);
        let mut report = ReplayReport::default();
        let mut start_after: Option<JsonValue> = None;

        loop {
            let mut query = CollectionQuery::new(collection.clone())
                .order_by("received_at")
                .order_by("event_id")
                .limit(REPLAY_PAGE_SIZE);
            if let Some(after) = &start_after {
                query = query.start_after(after.clone());
            }

            let page = self.store.query(query).await?;
            if page.is_empty() {
                break;
            }
            start_after = page.last().map(|(_, doc)| doc.clone());

            for (_, doc) in page {
                let envelope = match schema::validate_envelope(&doc) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        tracing::warn!(error = %err, "skipping malformed stored event");
                        continue;
                    }
                };
                report.events += 1;

                if envelope.kind().is_none() {
                    report.unknown_types += 1;
                    continue;
                }

                for view in self.project(&envelope).await? {
                    if view.updated {
                        report.views_updated += 1;
                    } else {
                        report.views_skipped += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}

/// Pure projection step: reduce `event` into the documents read by the
/// transaction. Returns the writes and per-view reports.
fn project_into_docs(
    event: &EventEnvelope,
    payload: &EventPayload,
    targets: &[ViewTarget],
    paths: &[String],
    docs: &[Option<JsonValue>],
    cursor: &EventCursor,
    now: DateTime<Utc>,
) -> Result<(Vec<(String, JsonValue)>, Vec<ViewReport>), ProjectorError> {
    let mut writes = Vec::new();
    let mut reports = Vec::new();

    for ((target, view_path), prior_doc) in targets.iter().zip(paths).zip(docs) {
        let prior_cursor = prior_cursor(view_path, prior_doc.as_ref())?;
        if !EventCursor::should_apply(prior_cursor.as_ref(), cursor) {
            reports.push(ViewReport::skipped(target.name()));
            continue;
        }

        // Ending a session also materializes its summary, under the same
        // cursor decision as the session view.
        if let (ViewTarget::Session, EventPayload::SessionEnded(ended)) = (target, payload) {
            let prev: Option<SessionView> = decode_view(view_path, prior_doc.as_ref())?;
            let session = SessionView::apply_ended(
                prev.as_ref(),
                ended,
                event.occurred_at,
                cursor.clone(),
                now,
            );
            let session_id =
                SessionId::parse(&event.entity.id).map_err(ProjectorError::InvalidPayload)?;
            let summary =
                SessionSummary::from_session(&session, ended, event.occurred_at, cursor.clone(), now);
            let summary_path =
                path::session_summary_path(&event.user_id, &event.library_id, &session_id);

            writes.push((view_path.clone(), encode_view(&session)?));
            reports.push(ViewReport::updated(target.name()));
            writes.push((summary_path, encode_view(&summary)?));
            reports.push(ViewReport::updated("session_summary"));
            continue;
        }

        let next = reduce_target(
            *target,
            event,
            payload,
            view_path,
            prior_doc.as_ref(),
            cursor,
            now,
        )?;
        writes.push((view_path.clone(), next));
        reports.push(ViewReport::updated(target.name()));
    }

    Ok((writes, reports))
}

type Outcome = Result<Vec<ViewReport>, ProjectorError>;

fn lock_outcome(outcome: &Arc<Mutex<Outcome>>) -> std::sync::MutexGuard<'_, Outcome> {
    outcome.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn prior_cursor(
    view_path: &str,
    doc: Option<&JsonValue>,
) -> Result<Option<EventCursor>, ProjectorError> {
    let Some(doc) = doc else {
        return Ok(None);
    };
    let cursor_value = doc
        .get("last_applied")
        .ok_or_else(|| ProjectorError::CorruptView {
            path: view_path.to_string(),
            message: "missing last_applied".to_string(),
        })?;
    serde_json::from_value(cursor_value.clone())
        .map(Some)
        .map_err(|e| ProjectorError::CorruptView {
            path: view_path.to_string(),
            message: e.to_string(),
        })
}

fn decode_view<T: DeserializeOwned>(
    view_path: &str,
    doc: Option<&JsonValue>,
) -> Result<Option<T>, ProjectorError> {
    match doc {
        None => Ok(None),
        Some(doc) => serde_json::from_value(doc.clone()).map(Some).map_err(|e| {
            ProjectorError::CorruptView {
                path: view_path.to_string(),
                message: e.to_string(),
            }
        }),
    }
}

fn encode_view<T: serde::Serialize>(view: &T) -> Result<JsonValue, ProjectorError> {
    serde_json::to_value(view).map_err(|e| {
        ProjectorError::InvalidPayload(DomainError::validation(format!(
            "view serialization failed: {e}"
        )))
    })
}

fn reduce_target(
    target: ViewTarget,
    event: &EventEnvelope,
    payload: &EventPayload,
    view_path: &str,
    prior_doc: Option<&JsonValue>,
    cursor: &EventCursor,
    now: DateTime<Utc>,
) -> Result<JsonValue, ProjectorError> {
    let occurred_at = event.occurred_at;
    let cursor = cursor.clone();

    let next = match (target, payload) {
        (ViewTarget::CardSchedule, EventPayload::CardReviewed(p)) => {
            let prev: Option<CardScheduleView> = decode_view(view_path, prior_doc)?;
            encode_view(&CardScheduleView::apply_review(
                prev.as_ref(),
                p,
                occurred_at,
                cursor,
                now,
            ))?
        }
        (ViewTarget::CardSchedule, EventPayload::AccelerationApplied(p)) => {
            let prev: Option<CardScheduleView> = decode_view(view_path, prior_doc)?;
            encode_view(&CardScheduleView::apply_acceleration(
                prev.as_ref(),
                p,
                cursor,
                now,
            )?)?
        }
        (ViewTarget::CardSchedule, EventPayload::LapseApplied(p)) => {
            let prev: Option<CardScheduleView> = decode_view(view_path, prior_doc)?;
            encode_view(&CardScheduleView::apply_lapse(prev.as_ref(), p, cursor, now)?)?
        }
        (ViewTarget::CardPerformance, EventPayload::CardReviewed(p)) => {
            let prev: Option<PerformanceView> = decode_view(view_path, prior_doc)?;
            encode_view(&PerformanceView::apply_answer(
                prev.as_ref(),
                p.grade.is_correct(),
                p.seconds_spent,
                cursor,
                now,
            ))?
        }
        (ViewTarget::QuestionPerformance, EventPayload::QuestionAttempted(p)) => {
            let prev: Option<PerformanceView> = decode_view(view_path, prior_doc)?;
            encode_view(&PerformanceView::apply_answer(
                prev.as_ref(),
                p.correct,
                p.seconds_spent,
                cursor,
                now,
            ))?
        }
        (ViewTarget::RelationshipSchedule, EventPayload::RelationshipReviewed(p)) => {
            let prev: Option<RelationshipScheduleView> = decode_view(view_path, prior_doc)?;
            encode_view(&RelationshipScheduleView::apply_review(
                prev.as_ref(),
                p,
                occurred_at,
                cursor,
                now,
            ))?
        }
        (ViewTarget::RelationshipPerformance, EventPayload::RelationshipReviewed(p)) => {
            let prev: Option<PerformanceView> = decode_view(view_path, prior_doc)?;
            encode_view(&PerformanceView::apply_answer(
                prev.as_ref(),
                p.correct,
                p.seconds_spent,
                cursor,
                now,
            ))?
        }
        (ViewTarget::MisconceptionEdge, EventPayload::MisconceptionProbeResult(p)) => {
            let prev: Option<MisconceptionEdgeView> = decode_view(view_path, prior_doc)?;
            encode_view(&MisconceptionEdgeView::apply_probe(
                prev.as_ref(),
                p,
                occurred_at,
                cursor,
                now,
            ))?
        }
        (ViewTarget::Session, EventPayload::SessionStarted(p)) => {
            let prev: Option<SessionView> = decode_view(view_path, prior_doc)?;
            encode_view(&SessionView::apply_started(
                prev.as_ref(),
                p,
                occurred_at,
                cursor,
                now,
            ))?
        }
        (ViewTarget::ConceptCertification, EventPayload::MasteryCertificationCompleted(p)) => {
            let prev: Option<ConceptCertificationView> = decode_view(view_path, prior_doc)?;
            encode_view(&ConceptCertificationView::apply_completion(
                prev.as_ref(),
                p,
                occurred_at,
                cursor,
                now,
            ))?
        }
        (ViewTarget::CardAnnotation, EventPayload::CardAnnotationUpdated(p)) => {
            let prev: Option<CardAnnotationView> = decode_view(view_path, prior_doc)?;
            encode_view(&CardAnnotationView::apply_update(
                prev.as_ref(),
                p,
                occurred_at,
                cursor,
                now,
            ))?
        }
        (target, payload) => {
            // The routing table and this match must stay in step.
            return Err(ProjectorError::InvalidPayload(DomainError::invariant(
                format!(
                    "no reducer for target {target:?} and event type '{}'",
                    payload.kind()
                ),
            )));
        }
    };

    Ok(next)
}
