//! Misconception edge view.
//!
//! Tracks the believed strength of a misconception between two concepts.
//! Probe results move the strength; other evidence counters are advanced by
//! event types outside this reducer and carry through untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retain_core::ConceptId;
use retain_events::{Direction, EventCursor, MisconceptionProbeResultPayload};

/// Strength below which the misconception counts as resolved.
const RESOLVED_BELOW: f64 = 0.2;
/// Strength above which the misconception counts as strong.
const STRONG_ABOVE: f64 = 0.8;
/// Strength assumed for an edge never probed before.
pub const DEFAULT_STRENGTH: f64 = 0.5;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MisconceptionStatus {
    Active,
    Strong,
    Resolved,
}

impl MisconceptionStatus {
    /// Status is a pure function of strength.
    pub fn from_strength(strength: f64) -> MisconceptionStatus {
        if strength < RESOLVED_BELOW {
            MisconceptionStatus::Resolved
        } else if strength > STRONG_ABOVE {
            MisconceptionStatus::Strong
        } else {
            MisconceptionStatus::Active
        }
    }
}

/// Evidence counters backing the strength estimate. Only
/// `probe_confirmations` is advanced here; the rest carry through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisconceptionEvidence {
    pub probe_confirmations: u32,
    #[serde(default)]
    pub question_confusions: u32,
    #[serde(default)]
    pub review_lapses: u32,
}

/// Per-edge misconception view.
///
/// Endpoint and type metadata is seeded by edge-creating events outside this
/// reducer; a probe against a never-seen edge leaves them unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MisconceptionEdgeView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_a_id: Option<ConceptId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_b_id: Option<ConceptId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misconception_type: Option<String>,
    pub strength: f64,
    pub status: MisconceptionStatus,
    pub evidence: MisconceptionEvidence,
    pub first_observed_at: DateTime<Utc>,
    pub last_observed_at: DateTime<Utc>,
    pub last_applied: EventCursor,
    pub updated_at: DateTime<Utc>,
}

impl MisconceptionEdgeView {
    /// Fold one probe result into the edge.
    pub fn apply_probe(
        prev: Option<&MisconceptionEdgeView>,
        payload: &MisconceptionProbeResultPayload,
        occurred_at: DateTime<Utc>,
        cursor: EventCursor,
        now: DateTime<Utc>,
    ) -> MisconceptionEdgeView {
        let prev_strength = prev.map(|p| p.strength).unwrap_or(DEFAULT_STRENGTH);
        let delta = if payload.confirmed { 0.1 } else { -0.05 };
        let strength = (prev_strength + delta).clamp(0.0, 1.0);

        let mut evidence = prev.map(|p| p.evidence.clone()).unwrap_or_default();
        if payload.confirmed {
            evidence.probe_confirmations += 1;
        }

        MisconceptionEdgeView {
            concept_a_id: prev.and_then(|p| p.concept_a_id.clone()),
            concept_b_id: prev.and_then(|p| p.concept_b_id.clone()),
            direction: prev.and_then(|p| p.direction.clone()),
            misconception_type: prev.and_then(|p| p.misconception_type.clone()),
            strength,
            status: MisconceptionStatus::from_strength(strength),
            evidence,
            first_observed_at: prev
                .map(|p| p.first_observed_at)
                .unwrap_or(occurred_at),
            last_observed_at: occurred_at,
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

    fn probe(confirmed: bool) -> MisconceptionProbeResultPayload {
        MisconceptionProbeResultPayload {
            confirmed,
            explanation_quality: None,
            seconds_spent: 20.0,
        }
    }

    fn t(ts: &str) -> DateTime<Utc> {
        ts.parse().unwrap()
    }

    #[test]
    fn first_confirmation_moves_strength_up() {
        let view = MisconceptionEdgeView::apply_probe(
            None,
            &probe(true),
            t("2025-01-01T00:00:00Z"),
            cursor("2025-01-01T00:00:00Z", "evt_a"),
            t("2025-01-01T00:00:00Z"),
        );

        assert!((view.strength - 0.6).abs() < 1e-9);
        assert_eq!(view.status, MisconceptionStatus::Active);
        assert_eq!(view.evidence.probe_confirmations, 1);
        assert_eq!(view.first_observed_at, t("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn refutations_drive_the_edge_to_resolved() {
        let mut view: Option<MisconceptionEdgeView> = None;
        for i in 0..8 {
            view = Some(MisconceptionEdgeView::apply_probe(
                view.as_ref(),
                &probe(false),
                t("2025-01-02T00:00:00Z"),
                cursor("2025-01-02T00:00:00Z", &format!("evt_{i}")),
                t("2025-01-02T00:00:00Z"),
            ));
        }
        let view = view.unwrap();
        assert!(view.strength < 0.2);
        assert_eq!(view.status, MisconceptionStatus::Resolved);
        assert_eq!(view.evidence.probe_confirmations, 0);
    }

    #[test]
    fn confirmations_drive_the_edge_to_strong() {
        let mut view: Option<MisconceptionEdgeView> = None;
        for i in 0..4 {
            view = Some(MisconceptionEdgeView::apply_probe(
                view.as_ref(),
                &probe(true),
                t("2025-01-02T00:00:00Z"),
                cursor("2025-01-02T00:00:00Z", &format!("evt_{i}")),
                t("2025-01-02T00:00:00Z"),
            ));
        }
        let view = view.unwrap();
        assert!((view.strength - 0.9).abs() < 1e-9);
        assert_eq!(view.status, MisconceptionStatus::Strong);
    }

    #[test]
    fn first_observed_is_sticky() {
        let first = MisconceptionEdgeView::apply_probe(
            None,
            &probe(true),
            t("2025-01-01T00:00:00Z"),
            cursor("2025-01-01T00:00:00Z", "evt_a"),
            t("2025-01-01T00:00:00Z"),
        );
        let second = MisconceptionEdgeView::apply_probe(
            Some(&first),
            &probe(true),
            t("2025-02-01T00:00:00Z"),
            cursor("2025-02-01T00:00:00Z", "evt_b"),
            t("2025-02-01T00:00:00Z"),
        );

        assert_eq!(second.first_observed_at, t("2025-01-01T00:00:00Z"));
        assert_eq!(second.last_observed_at, t("2025-02-01T00:00:00Z"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Strength stays within [0, 1] and status tracks it.
            #[test]
            fn strength_bounds_hold(outcomes in prop::collection::vec(any::<bool>(), 1..50)) {
                let now = "2025-01-01T00:00:00Z".parse().unwrap();
                let mut view: Option<MisconceptionEdgeView> = None;

                for (i, confirmed) in outcomes.into_iter().enumerate() {
                    let c = EventCursor::new(
                        now,
                        EventId::parse(format!("evt_{i}")).unwrap(),
                    );
                    let next = MisconceptionEdgeView::apply_probe(
                        view.as_ref(), &probe(confirmed), now, c, now,
                    );

                    prop_assert!((0.0..=1.0).contains(&next.strength));
                    prop_assert_eq!(
                        next.status,
                        MisconceptionStatus::from_strength(next.strength)
                    );
                    view = Some(next);
                }
            }
        }
    }
}
