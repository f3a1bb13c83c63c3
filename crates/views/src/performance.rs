//! Rolling performance view shared by cards, questions and relationship
//! cards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retain_events::EventCursor;

/// Smoothing factor of the time-per-item moving average.
pub const AVG_SECONDS_ALPHA: f64 = 0.2;

/// Per-entity answer statistics.
///
/// Counters are monotone; `accuracy_rate` stays within [0, 1]; `max_streak`
/// never decreases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceView {
    pub total_reviews: u64,
    pub correct_reviews: u64,
    pub accuracy_rate: f64,
    pub avg_seconds: f64,
    pub streak: u32,
    pub max_streak: u32,
    pub last_applied: EventCursor,
    pub updated_at: DateTime<Utc>,
}

impl PerformanceView {
    /// Fold one answer into the statistics.
    pub fn apply_answer(
        prev: Option<&PerformanceView>,
        correct: bool,
        seconds_spent: f64,
        cursor: EventCursor,
        now: DateTime<Utc>,
    ) -> PerformanceView {
        let (total, correct_count, avg_seconds, streak, max_streak) = match prev {
            Some(p) => (
                p.total_reviews,
                p.correct_reviews,
                p.avg_seconds,
                p.streak,
                p.max_streak,
            ),
            None => (0, 0, 0.0, 0, 0),
        };

        let total_reviews = total + 1;
        let correct_reviews = correct_count + u64::from(correct);
        let accuracy_rate =
            (correct_reviews as f64 / total_reviews as f64).clamp(0.0, 1.0);
        let avg_seconds = (avg_seconds * (1.0 - AVG_SECONDS_ALPHA)
            + seconds_spent * AVG_SECONDS_ALPHA)
            .max(0.0);
        let streak = if correct { streak + 1 } else { 0 };
        let max_streak = max_streak.max(streak);

        PerformanceView {
            total_reviews,
            correct_reviews,
            accuracy_rate,
            avg_seconds,
            streak,
            max_streak,
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
    fn first_answer_seeds_the_average() {
        let view = PerformanceView::apply_answer(
            None,
            true,
            18.0,
            cursor("2025-01-01T00:00:00Z", "evt_a"),
            t("2025-01-01T00:00:00Z"),
        );

        assert_eq!(view.total_reviews, 1);
        assert_eq!(view.correct_reviews, 1);
        assert_eq!(view.accuracy_rate, 1.0);
        assert!((view.avg_seconds - 3.6).abs() < 1e-9);
        assert_eq!(view.streak, 1);
        assert_eq!(view.max_streak, 1);
    }

    #[test]
    fn second_answer_applies_the_moving_average() {
        let first = PerformanceView::apply_answer(
            None,
            true,
            18.0,
            cursor("2025-01-01T00:00:00Z", "evt_a"),
            t("2025-01-01T00:00:00Z"),
        );
        let second = PerformanceView::apply_answer(
            Some(&first),
            true,
            12.0,
            cursor("2025-01-02T00:00:00Z", "evt_b"),
            t("2025-01-02T00:00:00Z"),
        );

        assert_eq!(second.total_reviews, 2);
        assert_eq!(second.correct_reviews, 2);
        assert_eq!(second.accuracy_rate, 1.0);
        assert!((second.avg_seconds - 5.28).abs() < 1e-9);
        assert_eq!(second.streak, 2);
        assert_eq!(second.max_streak, 2);
    }

    #[test]
    fn incorrect_answer_resets_streak_but_not_max() {
        let mut view: Option<PerformanceView> = None;
        for (i, correct) in [true, true, true, false, true].iter().enumerate() {
            view = Some(PerformanceView::apply_answer(
                view.as_ref(),
                *correct,
                5.0,
                cursor("2025-01-01T00:00:00Z", &format!("evt_{i}")),
                t("2025-01-01T00:00:00Z"),
            ));
        }
        let view = view.unwrap();
        assert_eq!(view.streak, 1);
        assert_eq!(view.max_streak, 3);
        assert_eq!(view.total_reviews, 5);
        assert_eq!(view.correct_reviews, 4);
        assert!((view.accuracy_rate - 0.8).abs() < 1e-9);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Counters are consistent and bounded for any answer sequence.
            #[test]
            fn accuracy_and_streak_bounds_hold(
                answers in prop::collection::vec((any::<bool>(), 0.0f64..600.0), 1..60)
            ) {
                let now = "2025-01-01T00:00:00Z".parse().unwrap();
                let mut view: Option<PerformanceView> = None;

                for (i, (correct, seconds)) in answers.into_iter().enumerate() {
                    let c = EventCursor::new(
                        now,
                        EventId::parse(format!("evt_{i}")).unwrap(),
                    );
                    let next = PerformanceView::apply_answer(
                        view.as_ref(), correct, seconds, c, now,
                    );

                    prop_assert!((0.0..=1.0).contains(&next.accuracy_rate));
                    prop_assert!(next.correct_reviews <= next.total_reviews);
                    prop_assert!(next.streak <= next.max_streak);
                    prop_assert!(next.avg_seconds >= 0.0);
                    if let Some(prev) = &view {
                        prop_assert!(next.total_reviews == prev.total_reviews + 1);
                        prop_assert!(next.max_streak >= prev.max_streak);
                    }
                    view = Some(next);
                }
            }
        }
    }
}
