//! Strongly-typed, prefix-tagged identifiers used across the pipeline.
//!
//! Every identifier is a string with a fixed prefix (`evt_`, `user_`, ...)
//! followed by an opaque suffix. The prefix is enforced on parse and on
//! deserialization, so a deserialized document can never carry an identifier
//! of the wrong kind.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! impl_prefixed_id {
    ($t:ident, $prefix:literal) => {
        impl_prefixed_id!($t, $prefix, deny: []);
    };
    ($t:ident, $prefix:literal, deny: [$($deny:literal),*]) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $t(String);

        impl $t {
            pub const PREFIX: &'static str = $prefix;

            /// Mint a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered) for the suffix. Prefer passing IDs
            /// explicitly in tests for determinism.
            pub fn new() -> Self {
                Self(format!("{}{}", $prefix, Uuid::now_v7().simple()))
            }

            /// Parse an identifier, enforcing the required prefix.
            pub fn parse(s: impl Into<String>) -> Result<Self, DomainError> {
                let s = s.into();
                let suffix = s.strip_prefix($prefix).ok_or_else(|| {
                    DomainError::invalid_id(format!(
                        "{}: expected prefix '{}', got '{}'",
                        stringify!($t),
                        $prefix,
                        s
                    ))
                })?;
                if suffix.is_empty() {
                    return Err(DomainError::invalid_id(format!(
                        "{}: empty suffix in '{}'",
                        stringify!($t),
                        s
                    )));
                }
                $(
                    if s.starts_with($deny) {
                        return Err(DomainError::invalid_id(format!(
                            "{}: '{}' belongs to a different identifier kind",
                            stringify!($t),
                            s
                        )));
                    }
                )*
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_prefixed_id!(EventId, "evt_");
impl_prefixed_id!(UserId, "user_");
impl_prefixed_id!(LibraryId, "lib_");
// `card_rel_` shares the `card_` prefix, so a CardId must reject it.
impl_prefixed_id!(CardId, "card_", deny: ["card_rel_"]);
impl_prefixed_id!(QuestionId, "q_");
impl_prefixed_id!(OptionId, "opt_");
impl_prefixed_id!(ConceptId, "concept_");
impl_prefixed_id!(SessionId, "session_");
impl_prefixed_id!(RelationshipCardId, "card_rel_");
impl_prefixed_id!(MisconceptionEdgeId, "mis_edge_");

/// Opaque source-device token. No prefix; must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    pub fn parse(s: impl Into<String>) -> Result<Self, DomainError> {
        let s = s.into();
        if s.is_empty() {
            return Err(DomainError::invalid_id("DeviceId: empty"));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<DeviceId> for String {
    fn from(value: DeviceId) -> Self {
        value.0
    }
}
