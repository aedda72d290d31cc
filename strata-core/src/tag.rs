//! Invalidation tags.

use std::fmt;

use crate::EntityId;

/// Target of a tag: one entity, or the whole collection of a kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagId {
    /// Sentinel meaning "depends on the whole collection". Never equal to a real id.
    List,
    Id(EntityId),
}

/// An abstract dependency label. Queries provide tags, mutations invalidate them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub kind: String,
    pub id: TagId,
}

impl Tag {
    /// `{kind, LIST}`
    pub fn list(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: TagId::List,
        }
    }

    /// `{kind, id}`
    pub fn entity(kind: impl Into<String>, id: impl Into<EntityId>) -> Self {
        Self {
            kind: kind.into(),
            id: TagId::Id(id.into()),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.id, TagId::List)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            TagId::List => write!(f, "{}:LIST", self.kind),
            TagId::Id(id) => write!(f, "{}:{}", self.kind, id),
        }
    }
}
