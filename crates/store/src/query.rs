//! Ordered collection scans.
//!
//! Queries address the direct children of one collection, filter on a single
//! document field, order by one or more fields ascending, and paginate with a
//! `start_after` document. Field values compare as JSON scalars; timestamps
//! are ISO-8601 strings, so string order is chronological order.

use std::cmp::Ordering;

use serde_json::Value as JsonValue;

/// Comparison operator for a field filter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FilterOp {
    Gt,
    GtEq,
    Lt,
    LtEq,
    Eq,
}

/// Single-field filter, `doc.field <op> value`.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: JsonValue,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: JsonValue) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn matches(&self, doc: &JsonValue) -> bool {
        let actual = doc.get(&self.field).unwrap_or(&JsonValue::Null);
        let Some(ordering) = compare_values(actual, &self.value) else {
            return false;
        };
        match self.op {
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::GtEq => ordering != Ordering::Less,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::LtEq => ordering != Ordering::Greater,
            FilterOp::Eq => ordering == Ordering::Equal,
        }
    }
}

/// Ordered, filtered scan over one collection.
#[derive(Debug, Clone)]
pub struct CollectionQuery {
    pub collection: String,
    pub filter: Option<FieldFilter>,
    /// Ascending order fields, most significant first.
    pub order_by: Vec<String>,
    pub limit: usize,
    /// Resume after this document (compared on the `order_by` fields).
    pub start_after: Option<JsonValue>,
}

impl CollectionQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: None,
            order_by: Vec::new(),
            limit: usize::MAX,
            start_after: None,
        }
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by.push(field.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn start_after(mut self, doc: JsonValue) -> Self {
        self.start_after = Some(doc);
        self
    }

    /// Order key of a document under this query.
    pub fn key_of<'a>(&self, doc: &'a JsonValue) -> Vec<&'a JsonValue> {
        self.order_by
            .iter()
            .map(|field| doc.get(field).unwrap_or(&JsonValue::Null))
            .collect()
    }
}

/// Compare two JSON scalars. `None` for mixed or non-scalar types.
pub fn compare_values(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        (JsonValue::Number(a), JsonValue::Number(b)) => {
            a.as_f64().partial_cmp(&b.as_f64())
        }
        (JsonValue::Bool(a), JsonValue::Bool(b)) => Some(a.cmp(b)),
        (JsonValue::Null, JsonValue::Null) => Some(Ordering::Equal),
        // Null sorts before any value, matching the backend's scan order.
        (JsonValue::Null, _) => Some(Ordering::Less),
        (_, JsonValue::Null) => Some(Ordering::Greater),
        _ => None,
    }
}

/// Compare two documents on the query's order fields.
pub fn compare_keys(a: &[&JsonValue], b: &[&JsonValue]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match compare_values(x, y) {
            Some(Ordering::Equal) => continue,
            Some(other) => return other,
            None => return Ordering::Equal,
        }
    }
    Ordering::Equal
}
