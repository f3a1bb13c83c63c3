//! Read-side scan for cards that are due.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use retain_core::{CardId, LibraryId, UserId};
use retain_events::{path, timefmt, ViewCollection};
use retain_store::{CollectionQuery, DocumentStore, FieldFilter, FilterOp};
use retain_views::CardScheduleView;

use crate::projector::ProjectorError;

/// A due card with its schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct DueCard {
    pub card_id: CardId,
    pub schedule: CardScheduleView,
}

/// Cards whose `due_at` is at or before `now`, most overdue first.
pub async fn due_cards<S: DocumentStore>(
    store: &S,
    user_id: &UserId,
    library_id: &LibraryId,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<DueCard>, ProjectorError> {
    let collection = path::view_collection(user_id, library_id, ViewCollection::CardSchedule);
    let query = CollectionQuery::new(collection)
        .filter(FieldFilter::new(
            "due_at",
            FilterOp::LtEq,
            JsonValue::String(timefmt::format(&now)),
        ))
        .order_by("due_at")
        .limit(limit);

    let mut due = Vec::new();
    for (doc_path, doc) in store.query(query).await? {
        let Some(card_id) = doc_path.rsplit('/').next() else {
            continue;
        };
        let card_id = match CardId::parse(card_id) {
            Ok(card_id) => card_id,
            Err(err) => {
                tracing::warn!(path = %doc_path, error = %err, "skipping non-card schedule doc");
                continue;
            }
        };
        let schedule: CardScheduleView =
            serde_json::from_value(doc).map_err(|e| ProjectorError::CorruptView {
                path: doc_path.clone(),
                message: e.to_string(),
            })?;
        due.push(DueCard { card_id, schedule });
    }

    Ok(due)
}
