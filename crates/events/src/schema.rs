//! Two-stage event validation.
//!
//! Stage one checks the envelope structure: required fields, identifier
//! prefixes, entity kind/id pairing, and the absence of mutation-indicating
//! fields. Stage two checks the payload against the schema registered for the
//! envelope's `type`.
//!
//! Ingestion runs stage one only, so envelopes with unknown types round-trip
//! through the store; the projector runs stage two and downgrades unknown
//! types to a logged no-op.

use serde_json::Value as JsonValue;

use retain_core::DomainError;

use crate::envelope::EventEnvelope;
use crate::payload::EventPayload;

/// Field names that would indicate event mutation. Events are immutable;
/// these are rejected wherever they appear.
pub const MUTATION_FIELDS: &[&str] = &["updated_at", "edited_at", "revision", "modified_at"];

/// Derived/aggregate fields that belong to views, never to payloads.
pub const AGGREGATE_FIELDS: &[&str] = &[
    "accuracy_rate",
    "streak",
    "max_streak",
    "total_reviews",
    "correct_reviews",
    "avg_seconds",
    "stability",
    "difficulty",
    "due",
    "due_at",
    "interval_days",
    "embedding",
    "embeddings",
];

fn reject_fields(
    object: &serde_json::Map<String, JsonValue>,
    forbidden: &[&str],
    context: &str,
) -> Result<(), DomainError> {
    for field in forbidden {
        if object.contains_key(*field) {
            return Err(DomainError::validation(format!(
                "{context} must not contain field '{field}'"
            )));
        }
    }
    Ok(())
}

/// Stage one: validate a raw document as an event envelope.
///
/// Accepts unknown `type` values; the decision about them is deferred to
/// projection.
pub fn validate_envelope(raw: &JsonValue) -> Result<EventEnvelope, DomainError> {
    let object = raw
        .as_object()
        .ok_or_else(|| DomainError::validation("event must be a JSON object"))?;

    reject_fields(object, MUTATION_FIELDS, "event envelope")?;

    let envelope: EventEnvelope = serde_json::from_value(raw.clone())
        .map_err(|e| DomainError::validation(format!("malformed event envelope: {e}")))?;

    envelope.entity.validate()?;

    if envelope.schema_version.is_empty() {
        return Err(DomainError::validation("schema_version must not be empty"));
    }

    let payload = envelope
        .payload
        .as_object()
        .ok_or_else(|| DomainError::validation("event payload must be a JSON object"))?;
    reject_fields(payload, MUTATION_FIELDS, "event payload")?;
    reject_fields(payload, AGGREGATE_FIELDS, "event payload")?;

    Ok(envelope)
}

/// Stage two: validate the payload against the schema for the envelope's
/// type and check the entity kind pairing.
///
/// Unknown types fail here; callers that tolerate them check
/// [`EventEnvelope::kind`] first.
pub fn validate_payload(envelope: &EventEnvelope) -> Result<EventPayload, DomainError> {
    let kind = envelope.kind().ok_or_else(|| {
        DomainError::validation(format!("unknown event type '{}'", envelope.event_type))
    })?;

    if !kind.allows_entity(envelope.entity.kind) {
        return Err(DomainError::validation(format!(
            "event type '{kind}' does not apply to entity kind '{}'",
            envelope.entity.kind
        )));
    }

    EventPayload::decode(kind, &envelope.payload)
}

/// Both stages in sequence. Used by client helpers before queueing, where an
/// unknown type would be a local bug rather than a version skew.
pub fn validate(raw: &JsonValue) -> Result<(EventEnvelope, EventPayload), DomainError> {
    let envelope = validate_envelope(raw)?;
    let payload = validate_payload(&envelope)?;
    Ok((envelope, payload))
}
