//! STRATA Core - Entity Types
//!
//! Pure data structures shared by the cache engine and the API declarations.
//! This crate contains ONLY data types and their shaping helpers.

pub mod error;
pub mod record;
pub mod request;
pub mod tag;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub use error::{CacheError, CacheResult, MutationError, ShapingError, TransportError};
pub use record::{ReactionKind, Reactions, Record};
pub use request::{HttpMethod, RequestDescriptor};
pub use tag::{Tag, TagId};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Stable identity of a cached entity.
///
/// Remote APIs hand out either numeric or string ids; both are accepted and
/// kept distinct (`5` and `"5"` are different ids).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Str(String),
}

impl EntityId {
    /// Read an id out of a JSON value. Floats, nulls and containers are rejected.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) if !s.is_empty() => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    /// The id as a JSON value, for request bodies and payload assembly.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Str(s) => Value::from(s.clone()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for EntityId {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Identity of a query-cache entry: endpoint name plus serialized argument.
///
/// `serde_json` maps are key-sorted, so structurally equal arguments always
/// serialize to the same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    pub endpoint: String,
    pub arg: String,
}

impl QueryKey {
    pub fn new(endpoint: impl Into<String>, arg: &Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            arg: arg.to_string(),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.endpoint, self.arg)
    }
}
