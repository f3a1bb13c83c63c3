//! Concept certification view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retain_events::{CertificationResult, EventCursor, MasteryCertificationCompletedPayload};

/// One completed certification run. History entries are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationAttempt {
    pub result: CertificationResult,
    pub date: DateTime<Utc>,
    pub questions_answered: u32,
    pub correct_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_quality: Option<String>,
}

/// Per-concept certification view.
///
/// `certification_history` grows without bound here; truncation is a product
/// decision taken outside the reducer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptCertificationView {
    pub certification_result: CertificationResult,
    pub accuracy: f64,
    pub certification_history: Vec<CertificationAttempt>,
    pub last_applied: EventCursor,
    pub updated_at: DateTime<Utc>,
}

impl ConceptCertificationView {
    /// Fold one completed certification into the view.
    pub fn apply_completion(
        prev: Option<&ConceptCertificationView>,
        payload: &MasteryCertificationCompletedPayload,
        occurred_at: DateTime<Utc>,
        cursor: EventCursor,
        now: DateTime<Utc>,
    ) -> ConceptCertificationView {
        let accuracy = if payload.questions_answered > 0 {
            (payload.correct_count as f64 / payload.questions_answered as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut certification_history = prev
            .map(|p| p.certification_history.clone())
            .unwrap_or_default();
        certification_history.push(CertificationAttempt {
            result: payload.certification_result,
            date: occurred_at,
            questions_answered: payload.questions_answered,
            correct_count: payload.correct_count,
            reasoning_quality: payload.reasoning_quality.clone(),
        });

        ConceptCertificationView {
            certification_result: payload.certification_result,
            accuracy,
            certification_history,
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

    fn t(ts: &str) -> DateTime<Utc> {
        ts.parse().unwrap()
    }

    #[test]
    fn partial_certification_accuracy() {
        let view = ConceptCertificationView::apply_completion(
            None,
            &MasteryCertificationCompletedPayload {
                certification_result: CertificationResult::Partial,
                questions_answered: 4,
                correct_count: 3,
                reasoning_quality: None,
            },
            t("2025-01-01T00:00:00Z"),
            cursor("2025-01-01T00:00:00Z", "evt_a"),
            t("2025-01-01T00:00:00Z"),
        );

        assert_eq!(view.certification_result, CertificationResult::Partial);
        assert!((view.accuracy - 0.75).abs() < 1e-9);
        assert_eq!(view.certification_history.len(), 1);
        assert_eq!(view.certification_history[0].questions_answered, 4);
        assert_eq!(view.certification_history[0].correct_count, 3);
    }

    #[test]
    fn zero_questions_yields_zero_accuracy() {
        let view = ConceptCertificationView::apply_completion(
            None,
            &MasteryCertificationCompletedPayload {
                certification_result: CertificationResult::None,
                questions_answered: 0,
                correct_count: 0,
                reasoning_quality: None,
            },
            t("2025-01-01T00:00:00Z"),
            cursor("2025-01-01T00:00:00Z", "evt_a"),
            t("2025-01-01T00:00:00Z"),
        );
        assert_eq!(view.accuracy, 0.0);
    }

    #[test]
    fn history_is_append_only() {
        let first = ConceptCertificationView::apply_completion(
            None,
            &MasteryCertificationCompletedPayload {
                certification_result: CertificationResult::Partial,
                questions_answered: 4,
                correct_count: 2,
                reasoning_quality: None,
            },
            t("2025-01-01T00:00:00Z"),
            cursor("2025-01-01T00:00:00Z", "evt_a"),
            t("2025-01-01T00:00:00Z"),
        );
        let second = ConceptCertificationView::apply_completion(
            Some(&first),
            &MasteryCertificationCompletedPayload {
                certification_result: CertificationResult::Full,
                questions_answered: 5,
                correct_count: 5,
                reasoning_quality: Some("solid".to_string()),
            },
            t("2025-02-01T00:00:00Z"),
            cursor("2025-02-01T00:00:00Z", "evt_b"),
            t("2025-02-01T00:00:00Z"),
        );

        assert_eq!(second.certification_history.len(), 2);
        assert_eq!(
            second.certification_history[0].result,
            CertificationResult::Partial
        );
        assert_eq!(second.certification_result, CertificationResult::Full);
        assert_eq!(second.accuracy, 1.0);
    }
}
