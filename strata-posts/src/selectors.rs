//! Post views over the `getPosts` entry.

use std::sync::Arc;

use serde_json::Value;
use strata_cache::{
    select_all_entities, select_all_ids, select_by_id, MemoSelector, QueryClient, QueryState,
};
use strata_core::{EntityId, Record};

use crate::endpoints::GET_POSTS;

/// Current state of the full posts list.
pub fn select_posts_result(client: &QueryClient) -> Arc<QueryState> {
    client.select(GET_POSTS, &Value::Null)
}

pub fn select_all_posts(state: &QueryState) -> Vec<&Record> {
    select_all_entities(state)
}

pub fn select_post_ids(state: &QueryState) -> &[EntityId] {
    select_all_ids(state)
}

pub fn select_post_by_id<'a>(state: &'a QueryState, id: &EntityId) -> Option<&'a Record> {
    select_by_id(state, id)
}

/// Posts authored by `user_id`, newest first.
pub fn posts_by_user(state: &QueryState, user_id: &EntityId) -> Vec<Record> {
    select_all_entities(state)
        .into_iter()
        .filter(|post| post.get("userId").and_then(EntityId::from_json).as_ref() == Some(user_id))
        .cloned()
        .collect()
}

fn all_posts(state: &QueryState, _: &()) -> Vec<Record> {
    select_all_entities(state).into_iter().cloned().collect()
}

/// Memoized post views. Keep one per consumer; each remembers its last input.
pub struct PostSelectors {
    all: MemoSelector<(), Vec<Record>>,
    by_user: MemoSelector<EntityId, Vec<Record>>,
}

impl PostSelectors {
    pub fn new() -> Self {
        Self {
            all: MemoSelector::new(all_posts),
            by_user: MemoSelector::new(posts_by_user),
        }
    }

    pub fn all_posts(&self, state: &Arc<QueryState>) -> Arc<Vec<Record>> {
        self.all.select(state, &())
    }

    pub fn select_posts_by_user(&self, state: &Arc<QueryState>, user_id: &EntityId) -> Arc<Vec<Record>> {
        self.by_user.select(state, user_id)
    }

    /// Recomputations across both views.
    pub fn recomputations(&self) -> u64 {
        self.all.recomputations() + self.by_user.recomputations()
    }
}

impl Default for PostSelectors {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backfill::shape_posts;
    use serde_json::json;
    use strata_cache::{QueryStatus, QueryData};

    fn loaded(raw: Value) -> Arc<QueryState> {
        Arc::new(QueryState {
            status: QueryStatus::Success,
            data: Some(Arc::new(shape_posts(raw).unwrap())),
            ..Default::default()
        })
    }

    #[test]
    fn test_posts_by_user_filters_and_keeps_order() {
        let state = loaded(json!([
            {"id": 1, "userId": 7, "date": "2024-01-01T00:00:00.000Z"},
            {"id": 2, "userId": 3, "date": "2024-01-03T00:00:00.000Z"},
            {"id": 3, "userId": 7, "date": "2024-01-02T00:00:00.000Z"},
        ]));
        let ids: Vec<EntityId> = posts_by_user(&state, &EntityId::Int(7))
            .into_iter()
            .map(|post| post.id)
            .collect();
        assert_eq!(ids, vec![EntityId::Int(3), EntityId::Int(1)]);
        assert!(posts_by_user(&state, &EntityId::Str("7".into())).is_empty());
    }

    #[test]
    fn test_memoized_views_follow_state_identity() {
        let selectors = PostSelectors::new();
        let state = loaded(json!([{"id": 1, "userId": 7}, {"id": 2, "userId": 8}]));

        let first = selectors.select_posts_by_user(&state, &EntityId::Int(7));
        let again = selectors.select_posts_by_user(&state, &EntityId::Int(7));
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.len(), 1);

        let all = selectors.all_posts(&state);
        assert_eq!(all.len(), 2);
        assert_eq!(selectors.recomputations(), 2);

        let other = selectors.select_posts_by_user(&state, &EntityId::Int(8));
        assert_eq!(other[0].id, EntityId::Int(2));
        assert_eq!(selectors.recomputations(), 3);
    }

    #[test]
    fn test_selectors_on_unloaded_state() {
        let state = QueryState::uninitialized();
        assert!(select_all_posts(&state).is_empty());
        assert!(select_post_ids(&state).is_empty());
        assert!(select_post_by_id(&state, &EntityId::Int(1)).is_none());

        let raw = QueryState {
            status: QueryStatus::Success,
            data: Some(Arc::new(QueryData::Value(json!(null)))),
            ..Default::default()
        };
        assert!(select_all_posts(&raw).is_empty());
    }
}
