//! Normalized record type and its reaction counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{EntityId, ShapingError};

/// Field holding the ISO-8601 creation timestamp.
pub const DATE_FIELD: &str = "date";

/// Field holding the reaction counters.
pub const REACTIONS_FIELD: &str = "reactions";

/// A uniquely identified domain record.
///
/// Besides `id`, fields are kept as loose JSON so the cache stays agnostic of
/// the remote schema. `date` and `reactions` have typed accessors because the
/// ordering rule and the optimistic reaction update depend on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: EntityId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Build a record from one element of a fetched collection.
    ///
    /// `index` is only used for error reporting.
    pub fn from_value(value: Value, index: usize) -> Result<Self, ShapingError> {
        let Value::Object(mut fields) = value else {
            return Err(ShapingError::NotAnObject { index });
        };
        let id = fields
            .remove("id")
            .as_ref()
            .and_then(EntityId::from_json)
            .ok_or(ShapingError::MissingId { index })?;
        Ok(Self { id, fields })
    }

    /// The record as a flat JSON object, `id` included.
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("id".to_string(), self.id.to_json());
        Value::Object(object)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Shallow merge: every field of `other` overwrites the same field here.
    /// The id never changes.
    pub fn merge(&mut self, other: &Record) {
        for (key, value) in &other.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// Parsed `date` field. `None` when absent or not RFC 3339.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.get(DATE_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
    }

    /// Parsed `reactions` field. `None` when absent or malformed.
    pub fn reactions(&self) -> Option<Reactions> {
        self.get(REACTIONS_FIELD)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_reactions(&mut self, reactions: &Reactions) {
        self.set(REACTIONS_FIELD, reactions.to_value());
    }
}

/// The fixed set of reactions a record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionKind {
    ThumbsUp,
    Wow,
    Heart,
    Rocket,
    Coffee,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 5] = [
        ReactionKind::ThumbsUp,
        ReactionKind::Wow,
        ReactionKind::Heart,
        ReactionKind::Rocket,
        ReactionKind::Coffee,
    ];

    /// Wire name of the counter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThumbsUp => "thumbsUp",
            Self::Wow => "wow",
            Self::Heart => "heart",
            Self::Rocket => "rocket",
            Self::Coffee => "coffee",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

/// Reaction counters, all zero by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reactions {
    #[serde(default)]
    pub thumbs_up: u32,
    #[serde(default)]
    pub wow: u32,
    #[serde(default)]
    pub heart: u32,
    #[serde(default)]
    pub rocket: u32,
    #[serde(default)]
    pub coffee: u32,
}

impl Reactions {
    pub fn get(&self, kind: ReactionKind) -> u32 {
        match kind {
            ReactionKind::ThumbsUp => self.thumbs_up,
            ReactionKind::Wow => self.wow,
            ReactionKind::Heart => self.heart,
            ReactionKind::Rocket => self.rocket,
            ReactionKind::Coffee => self.coffee,
        }
    }

    /// Copy with one counter bumped by one, saturating.
    pub fn incremented(mut self, kind: ReactionKind) -> Self {
        let counter = match kind {
            ReactionKind::ThumbsUp => &mut self.thumbs_up,
            ReactionKind::Wow => &mut self.wow,
            ReactionKind::Heart => &mut self.heart,
            ReactionKind::Rocket => &mut self.rocket,
            ReactionKind::Coffee => &mut self.coffee,
        };
        *counter = counter.saturating_add(1);
        self
    }

    pub fn total(&self) -> u64 {
        ReactionKind::ALL
            .into_iter()
            .map(|kind| u64::from(self.get(kind)))
            .sum()
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        for kind in ReactionKind::ALL {
            object.insert(kind.as_str().to_string(), Value::from(self.get(kind)));
        }
        Value::Object(object)
    }
}
