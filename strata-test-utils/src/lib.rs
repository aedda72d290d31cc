//! STRATA Test Utilities
//!
//! Centralized test infrastructure for the STRATA workspace:
//! - A scriptable mock transport
//! - Proptest generators for records, ids and tags
//! - Test fixtures for posts and users payloads
//! - Custom assertions for query-state validation

pub use strata_cache::{
    select_all_ids, CacheConfig, EndpointRegistry, EntityAdapter, EntitySnapshot, QueryClient,
    QueryData, QueryState, QueryStatus, TagIndex, Transport,
};
pub use strata_core::{
    record::{DATE_FIELD, REACTIONS_FIELD},
    CacheError, CacheResult, EntityId, HttpMethod, QueryKey, ReactionKind, Reactions, Record,
    RequestDescriptor, ShapingError, Tag, TagId, Timestamp, TransportError,
};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// Computes a response from the request, for routes that need server state.
pub type Responder = Arc<dyn Fn(&RequestDescriptor) -> Result<Value, TransportError> + Send + Sync>;

type RouteKey = (HttpMethod, String);

#[derive(Clone)]
enum Route {
    Fixed(Result<Value, TransportError>),
    Dynamic(Responder),
}

/// In-memory transport with per-route scripted responses.
///
/// Every call is logged and yields to the scheduler before answering, so
/// concurrent callers genuinely overlap. Unscripted routes answer 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<RouteKey, Route>>,
    queued: Mutex<HashMap<RouteKey, VecDeque<Result<Value, TransportError>>>>,
    log: Mutex<Vec<RequestDescriptor>>,
    delay: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call to `method path` with `response`.
    pub fn respond(&self, method: HttpMethod, path: &str, response: Result<Value, TransportError>) {
        lock(&self.routes).insert((method, path.to_string()), Route::Fixed(response));
    }

    pub fn respond_ok(&self, method: HttpMethod, path: &str, body: Value) {
        self.respond(method, path, Ok(body));
    }

    /// Answer every call to `method path` with an HTTP failure.
    pub fn fail(&self, method: HttpMethod, path: &str, status: u16) {
        self.respond(
            method,
            path,
            Err(TransportError::Status {
                status,
                body: format!("scripted failure for {} {}", method, path),
            }),
        );
    }

    /// Answer the next call to `method path` with `response`, ahead of any
    /// persistent route. Queued responses are consumed in order.
    pub fn respond_once(&self, method: HttpMethod, path: &str, response: Result<Value, TransportError>) {
        lock(&self.queued)
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
    }

    /// Compute responses to `method path` from the request.
    pub fn respond_with<F>(&self, method: HttpMethod, path: &str, responder: F)
    where
        F: Fn(&RequestDescriptor) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        lock(&self.routes).insert((method, path.to_string()), Route::Dynamic(Arc::new(responder)));
    }

    /// Sleep this long before answering instead of just yielding.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// All requests received so far, oldest first.
    pub fn requests(&self) -> Vec<RequestDescriptor> {
        lock(&self.log).clone()
    }

    pub fn calls(&self) -> usize {
        lock(&self.log).len()
    }

    pub fn calls_to(&self, method: HttpMethod, path: &str) -> usize {
        lock(&self.log)
            .iter()
            .filter(|request| request.method == method && request.path == path)
            .count()
    }

    pub fn clear_log(&self) {
        lock(&self.log).clear();
    }

    fn answer(&self, request: &RequestDescriptor) -> Result<Value, TransportError> {
        let key = (request.method, request.path.clone());
        if let Some(response) = lock(&self.queued).get_mut(&key).and_then(VecDeque::pop_front) {
            return response;
        }
        let route = lock(&self.routes).get(&key).cloned();
        match route {
            Some(Route::Fixed(response)) => response,
            Some(Route::Dynamic(responder)) => responder(request),
            None => Err(TransportError::Status {
                status: 404,
                body: format!("no route for {} {}", request.method, request.path),
            }),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: RequestDescriptor) -> Result<Value, TransportError> {
        lock(&self.log).push(request.clone());
        let delay = *lock(&self.delay);
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        self.answer(&request)
    }
}

/// Build a client over `transport` with the default cache configuration.
pub fn client_with(transport: Arc<MockTransport>, registry: EndpointRegistry) -> QueryClient {
    QueryClient::new(transport, registry, CacheConfig::default())
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating STRATA data types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a numeric or string entity id.
    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        prop_oneof![
            (1i64..100_000).prop_map(EntityId::Int),
            "[a-z0-9]{1,8}".prop_map(EntityId::Str),
        ]
    }

    /// Generate an id from a small pool, so collections contain repeats.
    pub fn arb_colliding_id() -> impl Strategy<Value = EntityId> {
        (1i64..12).prop_map(EntityId::Int)
    }

    /// Generate a timestamp between 1970 and 2033 with second precision.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (0i64..2_000_000_000).prop_filter_map("timestamp out of range", |secs| {
            chrono::DateTime::from_timestamp(secs, 0)
        })
    }

    pub fn arb_reaction_kind() -> impl Strategy<Value = ReactionKind> {
        prop::sample::select(ReactionKind::ALL.to_vec())
    }

    pub fn arb_reactions() -> impl Strategy<Value = Reactions> {
        (0u32..50, 0u32..50, 0u32..50, 0u32..50, 0u32..50).prop_map(
            |(thumbs_up, wow, heart, rocket, coffee)| Reactions {
                thumbs_up,
                wow,
                heart,
                rocket,
                coffee,
            },
        )
    }

    /// Generate a post-shaped record with the given id strategy.
    ///
    /// `date` and `reactions` are each present about half the time.
    pub fn arb_post_record_with(
        id: impl Strategy<Value = EntityId>,
    ) -> impl Strategy<Value = Record> {
        (
            id,
            "[A-Za-z ]{1,40}",
            1i64..11,
            prop::option::of(arb_timestamp()),
            prop::option::of(arb_reactions()),
        )
            .prop_map(|(id, title, user_id, date, reactions)| {
                let mut record = Record::new(id)
                    .with("title", title)
                    .with("body", "lorem ipsum")
                    .with("userId", user_id);
                if let Some(date) = date {
                    record.set(DATE_FIELD, date.to_rfc3339());
                }
                if let Some(reactions) = reactions {
                    record.set_reactions(&reactions);
                }
                record
            })
    }

    pub fn arb_post_record() -> impl Strategy<Value = Record> {
        arb_post_record_with(arb_entity_id())
    }

    /// Generate a collection that may repeat ids.
    pub fn arb_records(max_len: usize) -> impl Strategy<Value = Vec<Record>> {
        prop::collection::vec(arb_post_record_with(arb_colliding_id()), 0..max_len)
    }

    /// Generate a collection with unique ids.
    pub fn arb_unique_records(max_len: usize) -> impl Strategy<Value = Vec<Record>> {
        prop::collection::btree_set(1i64..10_000, 0..max_len).prop_flat_map(|ids| {
            ids.into_iter()
                .map(|id| arb_post_record_with(Just(EntityId::Int(id))))
                .collect::<Vec<_>>()
        })
    }

    /// Generate a tag over a small id pool.
    pub fn arb_tag() -> impl Strategy<Value = Tag> {
        (
            prop::sample::select(vec!["Post", "User"]),
            prop::option::of(1i64..8),
        )
            .prop_map(|(kind, id)| match id {
                Some(id) => Tag::entity(kind, id),
                None => Tag::list(kind),
            })
    }

    pub fn arb_tags(max_len: usize) -> impl Strategy<Value = Vec<Tag>> {
        prop::collection::vec(arb_tag(), 0..max_len)
    }

    /// Generate a cache key over a handful of endpoints and arguments.
    pub fn arb_query_key() -> impl Strategy<Value = QueryKey> {
        (
            prop::sample::select(vec!["getPosts", "getPost", "getUsers", "getPostsByUserId"]),
            prop::option::of(1i64..6),
        )
            .prop_map(|(endpoint, arg)| {
                let arg = arg.map(Value::from).unwrap_or(Value::Null);
                QueryKey::new(endpoint, &arg)
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built payloads and states for common testing scenarios.

    use super::*;
    use serde_json::json;

    /// A post as the remote API returns it: no `date`, no `reactions`.
    pub fn post_json(id: i64, user_id: i64, title: &str) -> Value {
        json!({
            "id": id,
            "userId": user_id,
            "title": title,
            "body": format!("body of {title}"),
        })
    }

    /// A post carrying a date and zeroed reactions.
    pub fn dated_post_json(id: i64, user_id: i64, title: &str, date: Timestamp) -> Value {
        let mut post = post_json(id, user_id, title);
        if let Some(object) = post.as_object_mut() {
            object.insert(DATE_FIELD.to_string(), Value::from(date.to_rfc3339()));
            object.insert(REACTIONS_FIELD.to_string(), Reactions::default().to_value());
        }
        post
    }

    /// `count` posts spread round-robin over `users` users, ids from 1.
    pub fn posts_payload(count: i64, users: i64) -> Value {
        let users = users.max(1);
        Value::Array(
            (1..=count)
                .map(|id| post_json(id, (id - 1) % users + 1, &format!("post {id}")))
                .collect(),
        )
    }

    pub fn user_json(id: i64, name: &str) -> Value {
        json!({"id": id, "name": name})
    }

    pub fn users_payload(names: &[&str]) -> Value {
        Value::Array(
            names
                .iter()
                .zip(1i64..)
                .map(|(name, id)| user_json(id, name))
                .collect(),
        )
    }

    pub fn post_record(id: i64, user_id: i64, title: &str) -> Record {
        Record::new(id)
            .with("userId", user_id)
            .with("title", title)
    }

    pub fn snapshot(records: Vec<Record>) -> EntitySnapshot {
        EntityAdapter::new().set_all(records)
    }

    /// A successfully fetched entity collection.
    pub fn loaded_state(records: Vec<Record>) -> Arc<QueryState> {
        Arc::new(QueryState {
            status: QueryStatus::Success,
            data: Some(Arc::new(QueryData::Entities(snapshot(records)))),
            error: None,
            fulfilled_at: Some(Utc::now()),
        })
    }

    pub fn http_error(status: u16) -> TransportError {
        TransportError::Status {
            status,
            body: format!("status {status}"),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for query-state validation.

    use super::*;

    #[track_caller]
    pub fn assert_success(state: &QueryState) {
        assert!(
            state.is_success(),
            "Expected success, got {} ({:?})",
            state.status,
            state.error
        );
        assert!(state.error.is_none(), "Success state carries an error");
    }

    /// Assert an error state caused by an HTTP status failure.
    #[track_caller]
    pub fn assert_error_status(state: &QueryState, status: u16) {
        assert!(state.is_error(), "Expected error, got {}", state.status);
        match &state.error {
            Some(CacheError::Transport(e)) => assert_eq!(e.status(), Some(status)),
            other => panic!("Expected transport error with status {status}, got: {:?}", other),
        }
    }

    /// Assert the entry's normalized ids, in order.
    #[track_caller]
    pub fn assert_ids(state: &QueryState, expected: &[i64]) {
        let expected: Vec<EntityId> = expected.iter().copied().map(EntityId::Int).collect();
        assert_eq!(select_all_ids(state), expected.as_slice());
    }

    #[track_caller]
    pub fn assert_same_state(a: &Arc<QueryState>, b: &Arc<QueryState>) {
        assert!(Arc::ptr_eq(a, b), "Expected the same state Arc");
    }

    /// Assert a mutation failure on `endpoint`.
    #[track_caller]
    pub fn assert_mutation_failed<T: std::fmt::Debug>(result: &CacheResult<T>, endpoint: &str) {
        match result {
            Err(CacheError::Mutation(e)) => assert_eq!(e.endpoint, endpoint),
            other => panic!("Expected mutation error for {endpoint}, got: {:?}", other),
        }
    }

    /// Every entity id appears once in `ids` and has a record.
    #[track_caller]
    pub fn assert_snapshot_consistent(snapshot: &EntitySnapshot) {
        let mut seen = std::collections::HashSet::new();
        for id in snapshot.ids() {
            assert!(seen.insert(id), "Duplicate id {id} in ids");
            assert!(snapshot.contains(id), "Id {id} has no record");
        }
        assert_eq!(snapshot.ids().len(), snapshot.entities().len());
    }

    /// Forward and reverse maps of `index` agree for `keys`.
    #[track_caller]
    pub fn assert_tag_index_consistent(index: &TagIndex, keys: &[QueryKey]) {
        for key in keys {
            for tag in index.tags_for(key) {
                assert!(
                    index.resolve([&tag]).contains(key),
                    "Tag {tag} does not resolve back to {key}"
                );
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_transport_routes_and_logs() {
        let transport = MockTransport::new();
        transport.respond_ok(HttpMethod::Get, "/posts", json!([]));
        transport.fail(HttpMethod::Delete, "/posts/1", 500);

        assert_eq!(
            transport.fetch(RequestDescriptor::get("/posts")).await,
            Ok(json!([]))
        );
        let err = transport
            .fetch(RequestDescriptor::delete("/posts/1"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));

        let missing = transport
            .fetch(RequestDescriptor::get("/nope"))
            .await
            .unwrap_err();
        assert_eq!(missing.status(), Some(404));

        assert_eq!(transport.calls(), 3);
        assert_eq!(transport.calls_to(HttpMethod::Get, "/posts"), 1);
    }

    #[tokio::test]
    async fn test_queued_responses_win_then_drain() {
        let transport = MockTransport::new();
        transport.respond_ok(HttpMethod::Get, "/posts", json!("steady"));
        transport.respond_once(HttpMethod::Get, "/posts", Ok(json!("first")));

        let get = || transport.fetch(RequestDescriptor::get("/posts"));
        assert_eq!(get().await, Ok(json!("first")));
        assert_eq!(get().await, Ok(json!("steady")));
    }

    #[tokio::test]
    async fn test_dynamic_responder_sees_body() {
        let transport = MockTransport::new();
        transport.respond_with(HttpMethod::Post, "/posts", |request| {
            Ok(request.body.clone().unwrap_or(Value::Null))
        });

        let body = json!({"title": "t"});
        let echoed = transport
            .fetch(RequestDescriptor::post("/posts", body.clone()))
            .await;
        assert_eq!(echoed, Ok(body));
    }

    #[test]
    fn test_posts_payload_fixture() {
        let payload = fixtures::posts_payload(5, 2);
        let posts = payload.as_array().unwrap();
        assert_eq!(posts.len(), 5);
        assert_eq!(posts[0]["userId"], json!(1));
        assert_eq!(posts[1]["userId"], json!(2));
        assert_eq!(posts[2]["userId"], json!(1));
        assert!(posts[0].get(DATE_FIELD).is_none());
    }

    #[test]
    fn test_loaded_state_fixture() {
        let state = fixtures::loaded_state(vec![
            fixtures::post_record(2, 1, "b"),
            fixtures::post_record(1, 1, "a"),
        ]);
        assertions::assert_success(&state);
        assertions::assert_ids(&state, &[2, 1]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_unique_records_have_unique_ids(records in generators::arb_unique_records(20)) {
            let snapshot = fixtures::snapshot(records.clone());
            prop_assert_eq!(snapshot.len(), records.len());
            assertions::assert_snapshot_consistent(&snapshot);
        }

        #[test]
        fn prop_generated_dates_parse(record in generators::arb_post_record()) {
            if record.get(DATE_FIELD).is_some() {
                prop_assert!(record.date().is_some());
            }
        }
    }
}
