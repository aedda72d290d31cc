//! Query entry state.
//!
//! A [`QueryState`] is immutable once published. Every transition builds a new
//! one and swaps the entry's `Arc`, so two reads of an untouched entry return
//! the same pointer.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use strata_core::{CacheError, Timestamp};

use crate::entity_store::EntitySnapshot;

/// Lifecycle of a query-cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueryStatus {
    #[default]
    Uninitialized,
    Loading,
    Success,
    Error,
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Result stored in an entry: a normalized collection or the shaped payload.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Entities(EntitySnapshot),
    Value(Value),
}

impl QueryData {
    pub fn as_entities(&self) -> Option<&EntitySnapshot> {
        match self {
            Self::Entities(snapshot) => Some(snapshot),
            Self::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Entities(_) => None,
        }
    }
}

/// Published state of one query-cache entry.
///
/// `error` is set iff `status` is [`QueryStatus::Error`]. `data` survives
/// errors and refetches: the last good result stays readable until a newer
/// one replaces it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryState {
    pub status: QueryStatus,
    pub data: Option<Arc<QueryData>>,
    pub error: Option<CacheError>,
    /// When `data` was last replaced by a successful fetch.
    pub fulfilled_at: Option<Timestamp>,
}

impl QueryState {
    pub fn uninitialized() -> Self {
        Self::default()
    }

    pub fn is_uninitialized(&self) -> bool {
        self.status == QueryStatus::Uninitialized
    }

    /// First load in progress, nothing to show yet.
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading && self.data.is_none()
    }

    /// Any fetch in progress, including refetches over existing data.
    pub fn is_fetching(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub(crate) fn loading(&self) -> Self {
        Self {
            status: QueryStatus::Loading,
            data: self.data.clone(),
            error: None,
            fulfilled_at: self.fulfilled_at,
        }
    }

    pub(crate) fn fulfilled(data: Arc<QueryData>) -> Self {
        Self {
            status: QueryStatus::Success,
            data: Some(data),
            error: None,
            fulfilled_at: Some(Utc::now()),
        }
    }

    pub(crate) fn failed(&self, error: CacheError) -> Self {
        Self {
            status: QueryStatus::Error,
            data: self.data.clone(),
            error: Some(error),
            fulfilled_at: self.fulfilled_at,
        }
    }

    /// Same lifecycle, different data. Used by optimistic patches.
    pub(crate) fn with_data(&self, data: Arc<QueryData>) -> Self {
        Self {
            status: self.status,
            data: Some(data),
            error: self.error.clone(),
            fulfilled_at: self.fulfilled_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::TransportError;

    #[test]
    fn test_failed_keeps_last_good_data() {
        let data = Arc::new(QueryData::Value(json!([1, 2])));
        let ok = QueryState::fulfilled(data.clone());
        let err = ok.failed(CacheError::Transport(TransportError::Network {
            reason: "down".to_string(),
        }));

        assert!(err.is_error());
        assert!(err.error.is_some());
        assert!(Arc::ptr_eq(err.data.as_ref().unwrap(), &data));
        assert_eq!(err.fulfilled_at, ok.fulfilled_at);
    }

    #[test]
    fn test_loading_clears_error() {
        let state = QueryState::uninitialized().failed(CacheError::ClientDropped);
        let loading = state.loading();
        assert!(loading.is_loading());
        assert!(loading.error.is_none());
    }

    #[test]
    fn test_refetch_is_fetching_not_loading() {
        let ok = QueryState::fulfilled(Arc::new(QueryData::Value(json!(1))));
        let refetching = ok.loading();
        assert!(refetching.is_fetching());
        assert!(!refetching.is_loading());
    }

    #[test]
    fn test_query_data_accessors() {
        let entities = QueryData::Entities(EntitySnapshot::new());
        assert!(entities.as_entities().is_some());
        assert!(entities.as_value().is_none());
        assert_eq!(QueryStatus::Success.to_string(), "success");
    }
}
