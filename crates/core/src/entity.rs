//! Domain-object references carried by events.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Kind of domain object an event refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Card,
    Question,
    RelationshipCard,
    Concept,
    Session,
    MisconceptionEdge,
    LibraryVersion,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Card => "card",
            EntityKind::Question => "question",
            EntityKind::RelationshipCard => "relationship_card",
            EntityKind::Concept => "concept",
            EntityKind::Session => "session",
            EntityKind::MisconceptionEdge => "misconception_edge",
            EntityKind::LibraryVersion => "library_version",
        }
    }

    /// Identifier prefix expected for entities of this kind.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EntityKind::Card => "card_",
            EntityKind::Question => "q_",
            EntityKind::RelationshipCard => "card_rel_",
            EntityKind::Concept => "concept_",
            EntityKind::Session => "session_",
            EntityKind::MisconceptionEdge => "mis_edge_",
            EntityKind::LibraryVersion => "lib_",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the domain object an event affects.
///
/// The `id` is kept as a raw string because its concrete type depends on
/// `kind`; `validate` enforces the kind/prefix pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Check that the identifier matches the prefix required by `kind`.
    pub fn validate(&self) -> Result<(), DomainError> {
        let prefix = self.kind.id_prefix();
        let suffix = self.id.strip_prefix(prefix).ok_or_else(|| {
            DomainError::invalid_id(format!(
                "entity id '{}' lacks prefix '{}' required for kind '{}'",
                self.id, prefix, self.kind
            ))
        })?;
        if suffix.is_empty() {
            return Err(DomainError::invalid_id(format!(
                "entity id '{}' has an empty suffix",
                self.id
            )));
        }
        // A plain card reference must not smuggle in a relationship card.
        if self.kind == EntityKind::Card && self.id.starts_with("card_rel_") {
            return Err(DomainError::invalid_id(format!(
                "entity id '{}' is a relationship card, not a card",
                self.id
            )));
        }
        Ok(())
    }
}
