//! In-memory document store.
//!
//! Intended for tests/dev. Transactions serialize on the map lock, so the
//! conflict path of the contract never fires here.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::adapter::{DocumentStore, StoreError, TxnBody, MAX_READ_BATCH};
use crate::query::{compare_keys, CollectionQuery};

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    docs: Mutex<BTreeMap<String, JsonValue>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents (test helper).
    pub fn len(&self) -> usize {
        self.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, JsonValue>>, StoreError> {
        self.docs
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }
}

/// `path` is a direct child of `collection`.
fn is_direct_child(collection: &str, path: &str) -> bool {
    path.strip_prefix(collection)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|id| !id.is_empty() && !id.contains('/'))
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_if_absent(&self, path: &str, doc: JsonValue) -> Result<bool, StoreError> {
        let mut docs = self.lock()?;
        if docs.contains_key(path) {
            return Ok(false);
        }
        docs.insert(path.to_string(), doc);
        Ok(true)
    }

    async fn read(&self, path: &str) -> Result<Option<JsonValue>, StoreError> {
        Ok(self.lock()?.get(path).cloned())
    }

    async fn read_many(&self, paths: &[String]) -> Result<Vec<Option<JsonValue>>, StoreError> {
        if paths.len() > MAX_READ_BATCH {
            return Err(StoreError::InvalidRequest(format!(
                "read_many batch of {} exceeds the ceiling of {MAX_READ_BATCH}",
                paths.len()
            )));
        }
        let docs = self.lock()?;
        Ok(paths.iter().map(|p| docs.get(p).cloned()).collect())
    }

    async fn write(&self, path: &str, doc: JsonValue) -> Result<(), StoreError> {
        self.lock()?.insert(path.to_string(), doc);
        Ok(())
    }

    async fn batch_write(&self, writes: Vec<(String, JsonValue)>) -> Result<(), StoreError> {
        let mut docs = self.lock()?;
        for (path, doc) in writes {
            docs.insert(path, doc);
        }
        Ok(())
    }

    async fn transaction(
        &self,
        read_paths: Vec<String>,
        mut body: TxnBody<'_>,
    ) -> Result<usize, StoreError> {
        // The lock spans read + body + write, so the unit is atomic.
        let mut docs = self.lock()?;
        let snapshot: Vec<Option<JsonValue>> =
            read_paths.iter().map(|p| docs.get(p).cloned()).collect();

        let writes = body(&snapshot)?;
        let written = writes.len();
        for (path, doc) in writes {
            docs.insert(path, doc);
        }
        Ok(written)
    }

    async fn query(
        &self,
        query: CollectionQuery,
    ) -> Result<Vec<(String, JsonValue)>, StoreError> {
        let docs = self.lock()?;

        let range = (
            Bound::Excluded(format!("{}/", query.collection)),
            Bound::Excluded(format!("{}0", query.collection)),
        );

        let mut matched: Vec<(&String, &JsonValue)> = docs
            .range::<String, _>(range)
            .filter(|(path, _)| is_direct_child(&query.collection, path))
            .filter(|(_, doc)| query.filter.as_ref().is_none_or(|f| f.matches(doc)))
            .collect();

        matched.sort_by(|(_, a), (_, b)| compare_keys(&query.key_of(a), &query.key_of(b)));

        let after_key = query.start_after.as_ref();
        let results = matched
            .into_iter()
            .filter(|(_, doc)| {
                after_key.is_none_or(|after| {
                    compare_keys(&query.key_of(doc), &query.key_of(after))
                        == std::cmp::Ordering::Greater
                })
            })
            .take(query.limit)
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FieldFilter, FilterOp};
    use serde_json::json;

    #[tokio::test]
    async fn create_if_absent_is_create_only() {
        let store = InMemoryDocumentStore::new();
        assert!(store.create_if_absent("a/b", json!({"v": 1})).await.unwrap());
        assert!(!store.create_if_absent("a/b", json!({"v": 2})).await.unwrap());
        assert_eq!(store.read("a/b").await.unwrap(), Some(json!({"v": 1})));
    }

    #[tokio::test]
    async fn read_many_preserves_order_and_enforces_ceiling() {
        let store = InMemoryDocumentStore::new();
        store.write("a/1", json!(1)).await.unwrap();
        store.write("a/3", json!(3)).await.unwrap();

        let result = store
            .read_many(&["a/3".to_string(), "a/2".to_string(), "a/1".to_string()])
            .await
            .unwrap();
        assert_eq!(result, vec![Some(json!(3)), None, Some(json!(1))]);

        let too_many: Vec<String> = (0..11).map(|i| format!("a/{i}")).collect();
        assert!(store.read_many(&too_many).await.is_err());
    }

    #[tokio::test]
    async fn transaction_reads_and_writes_atomically() {
        let store = InMemoryDocumentStore::new();
        store.write("views/x", json!({"count": 1})).await.unwrap();

        let written = store
            .transaction(
                vec!["views/x".to_string(), "views/y".to_string()],
                Box::new(|docs| {
                    assert_eq!(docs[0], Some(json!({"count": 1})));
                    assert_eq!(docs[1], None);
                    Ok(vec![
                        ("views/x".to_string(), json!({"count": 2})),
                        ("views/y".to_string(), json!({"count": 1})),
                    ])
                }),
            )
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(store.read("views/x").await.unwrap(), Some(json!({"count": 2})));
        assert_eq!(store.read("views/y").await.unwrap(), Some(json!({"count": 1})));
    }

    #[tokio::test]
    async fn query_scans_direct_children_in_order() {
        let store = InMemoryDocumentStore::new();
        let collection = "users/user_1/libraries/lib_1/events";
        for (id, at) in [
            ("evt_c", "2025-01-03T00:00:00Z"),
            ("evt_a", "2025-01-01T00:00:00Z"),
            ("evt_b", "2025-01-02T00:00:00Z"),
        ] {
            store
                .write(
                    &format!("{collection}/{id}"),
                    json!({"event_id": id, "received_at": at}),
                )
                .await
                .unwrap();
        }
        // A nested document must not appear in the scan.
        store
            .write(&format!("{collection}/evt_a/extra"), json!({}))
            .await
            .unwrap();

        let query = CollectionQuery::new(collection)
            .filter(FieldFilter::new(
                "received_at",
                FilterOp::Gt,
                json!("2025-01-01T00:00:00Z"),
            ))
            .order_by("received_at")
            .order_by("event_id");

        let docs = store.query(query).await.unwrap();
        let ids: Vec<&str> = docs
            .iter()
            .map(|(_, d)| d["event_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["evt_b", "evt_c"]);
    }

    #[tokio::test]
    async fn query_paginates_with_start_after() {
        let store = InMemoryDocumentStore::new();
        let collection = "users/user_1/libraries/lib_1/events";
        for id in ["evt_a", "evt_b", "evt_c", "evt_d"] {
            store
                .write(
                    &format!("{collection}/{id}"),
                    json!({"event_id": id, "received_at": "2025-01-01T00:00:00Z"}),
                )
                .await
                .unwrap();
        }

        let base = CollectionQuery::new(collection)
            .order_by("received_at")
            .order_by("event_id")
            .limit(2);

        let first = store.query(base.clone()).await.unwrap();
        assert_eq!(first.len(), 2);
        let (_, last_doc) = first.last().unwrap().clone();
        let second = store.query(base.clone().start_after(last_doc)).await.unwrap();
        let ids: Vec<&str> = second
            .iter()
            .map(|(_, d)| d["event_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["evt_c", "evt_d"]);
    }
}
