//! Fixed-width serialization for `received_at`.
//!
//! Inbound sync and replay order events by comparing `received_at` strings.
//! String order only equals chronological order when every timestamp has the
//! same width, so the acknowledgement time always serializes with exactly six
//! fractional digits. Parsing accepts any RFC-3339 precision.

use chrono::{DateTime, Utc};
use serde::{self, Deserialize, Deserializer, Serializer};

const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Render a timestamp in the wire format used for `received_at`.
pub fn format(dt: &DateTime<Utc>) -> String {
    dt.format(WIRE_FORMAT).to_string()
}

pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(dt))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}
