//! Query client: the cache engine callers talk to.
//!
//! All cache state sits behind one mutex that is never held across an
//! `.await`. Each transition (fetch start, fetch settle, tag reconciliation,
//! patch apply/undo, eviction) happens inside a single critical section, so no
//! other cache step can interleave with it. Transport calls are the only
//! suspension points.
//!
//! In-flight fetches are stored in their entry as shared futures: every
//! subscriber that arrives while a fetch is running awaits the same call, and
//! the fetch settles the entry exactly once, from inside the shared future.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use once_cell::sync::Lazy;
use serde_json::Value;
use strata_core::{
    CacheError, CacheResult, MutationError, QueryKey, RequestDescriptor, Tag, TransportError,
};
use tokio::task::JoinHandle;

use crate::config::CacheConfig;
use crate::endpoint::{EndpointRegistry, OptimisticUpdate, QueryEndpoint};
use crate::optimistic::{PatchId, PatchStack, PatchState};
use crate::query::{QueryData, QueryState};
use crate::stats::CacheStats;
use crate::tag_index::TagIndex;
use crate::transport::Transport;

type SharedFetch = Shared<BoxFuture<'static, Arc<QueryState>>>;

static UNINITIALIZED: Lazy<Arc<QueryState>> = Lazy::new(|| Arc::new(QueryState::uninitialized()));

struct PendingFetch {
    request_id: u64,
    future: SharedFetch,
}

struct QueryEntry {
    arg: Value,
    state: Arc<QueryState>,
    tags: BTreeSet<Tag>,
    subscribers: usize,
    stale: bool,
    pending: Option<PendingFetch>,
    patches: PatchStack,
    idle_since: Option<Instant>,
}

impl QueryEntry {
    fn new(arg: Value) -> Self {
        Self {
            arg,
            state: Arc::clone(&UNINITIALIZED),
            tags: BTreeSet::new(),
            subscribers: 0,
            stale: false,
            pending: None,
            patches: PatchStack::new(),
            idle_since: Some(Instant::now()),
        }
    }

    fn needs_fetch(&self) -> bool {
        self.pending.is_none() && (self.stale || self.state.is_uninitialized() || self.state.is_error())
    }

    fn is_evictable(&self, now: Instant, keep_unused_for: Duration) -> bool {
        self.subscribers == 0
            && self.pending.is_none()
            && self.patches.is_empty()
            && self
                .idle_since
                .is_some_and(|since| now.saturating_duration_since(since) >= keep_unused_for)
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<QueryKey, QueryEntry>,
    tags: TagIndex,
    stats: CacheStats,
    next_request_id: u64,
    next_patch_id: PatchId,
}

impl CacheState {
    fn remove_entry(&mut self, key: &QueryKey) {
        if self.entries.remove(key).is_some() {
            self.tags.remove_key(key);
        }
    }

    fn evict_expired(&mut self, now: Instant, keep_unused_for: Duration) -> usize {
        let expired: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_evictable(now, keep_unused_for))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            tracing::debug!(key = %key, "Evicting unused query entry");
            self.remove_entry(key);
        }
        self.stats.evictions += expired.len() as u64;
        expired.len()
    }
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    registry: EndpointRegistry,
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl ClientInner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transition `key` to loading and create its shared fetch.
    ///
    /// Any fetch already in flight for the entry is superseded: its response
    /// will be discarded when it arrives.
    fn begin_fetch(
        self: &Arc<Self>,
        state: &mut CacheState,
        key: &QueryKey,
        endpoint: QueryEndpoint,
    ) -> SharedFetch {
        state.next_request_id += 1;
        let request_id = state.next_request_id;

        let Some(entry) = state.entries.get_mut(key) else {
            return future::ready(Arc::clone(&UNINITIALIZED)).boxed().shared();
        };
        entry.stale = false;

        let request = match (endpoint.build_request)(&entry.arg) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to build query request");
                entry.pending = None;
                entry.state = Arc::new(entry.state.failed(e));
                return future::ready(Arc::clone(&entry.state)).boxed().shared();
            }
        };

        tracing::debug!(key = %key, request_id, path = %request.path, "Starting fetch");
        entry.state = Arc::new(entry.state.loading());
        state.stats.fetches += 1;

        let fetch = self.fetch_and_settle(key.clone(), request_id, request).boxed().shared();
        entry.pending = Some(PendingFetch {
            request_id,
            future: fetch.clone(),
        });

        // Outside a runtime the fetch runs when the first subscriber awaits it.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(fetch.clone());
        }
        fetch
    }

    fn fetch_and_settle(
        self: &Arc<Self>,
        key: QueryKey,
        request_id: u64,
        request: RequestDescriptor,
    ) -> impl Future<Output = Arc<QueryState>> + Send + 'static {
        let transport = Arc::clone(&self.transport);
        let inner = Arc::downgrade(self);
        async move {
            let outcome = transport.fetch(request).await;
            match Weak::upgrade(&inner) {
                Some(inner) => inner.settle(&key, request_id, outcome),
                None => Arc::new(QueryState::uninitialized().failed(CacheError::ClientDropped)),
            }
        }
    }

    /// Apply a transport outcome to the entry that requested it.
    fn settle(
        &self,
        key: &QueryKey,
        request_id: u64,
        outcome: Result<Value, TransportError>,
    ) -> Arc<QueryState> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(entry) = state.entries.get_mut(key) else {
            tracing::debug!(key = %key, request_id, "Entry dropped before fetch settled");
            return Arc::clone(&UNINITIALIZED);
        };
        match &entry.pending {
            Some(pending) if pending.request_id == request_id => {}
            _ => {
                tracing::debug!(key = %key, request_id, "Discarding superseded response");
                return Arc::clone(&entry.state);
            }
        }
        entry.pending = None;

        let shaped = match self.registry.query_endpoint(&key.endpoint) {
            Ok(endpoint) => outcome
                .map_err(CacheError::from)
                .and_then(|raw| endpoint.shape(raw).map_err(CacheError::from))
                .map(|data| {
                    let tags = endpoint.tags(&data, &entry.arg);
                    (data, tags)
                }),
            Err(e) => Err(e),
        };

        match shaped {
            Ok((data, tags)) => {
                let tags: BTreeSet<Tag> = tags.into_iter().collect();
                let old_tags = std::mem::replace(&mut entry.tags, tags);
                state.tags.reconcile(key, &old_tags, &entry.tags);

                let superseded = entry.patches.supersede_all();
                if superseded > 0 {
                    tracing::debug!(key = %key, superseded, "Fresh data superseded optimistic patches");
                }
                entry.state = Arc::new(QueryState::fulfilled(Arc::new(data)));
                tracing::debug!(key = %key, request_id, tags = entry.tags.len(), "Fetch succeeded");
            }
            Err(e) => {
                tracing::warn!(key = %key, request_id, error = %e, "Fetch failed");
                entry.state = Arc::new(entry.state.failed(e));
            }
        }
        Arc::clone(&entry.state)
    }

    fn release(&self, key: &QueryKey) {
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(key) else {
            return;
        };
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0 {
            entry.idle_since = Some(Instant::now());
            if self.config.keep_unused_for.is_zero() {
                state.evict_expired(Instant::now(), Duration::ZERO);
            }
        }
    }
}

/// Handle to the cache engine. Cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

impl QueryClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: EndpointRegistry,
        config: CacheConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                registry,
                config,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.inner.registry
    }

    /// Subscribe to `endpoint(arg)` and wait until its current fetch, if any,
    /// has settled.
    ///
    /// Transport and shaping failures do not fail this call; they are visible
    /// on the returned subscription's state.
    pub async fn query(&self, endpoint: &str, arg: Value) -> CacheResult<QuerySubscription> {
        let subscription = self.subscribe(endpoint, arg)?;
        subscription.settled().await;
        Ok(subscription)
    }

    /// Subscribe to `endpoint(arg)` without waiting.
    ///
    /// Joins an in-flight fetch for the same key, reuses a fresh entry, and
    /// only starts a new transport call when the entry is new, stale, or in
    /// error.
    pub fn subscribe(&self, endpoint: &str, arg: Value) -> CacheResult<QuerySubscription> {
        let definition = self.inner.registry.query_endpoint(endpoint)?;
        let key = QueryKey::new(endpoint, &arg);

        let mut state = self.inner.lock();
        state.evict_expired(Instant::now(), self.inner.config.keep_unused_for);

        let entry = state
            .entries
            .entry(key.clone())
            .or_insert_with(|| QueryEntry::new(arg));
        entry.subscribers += 1;
        entry.idle_since = None;

        if entry.needs_fetch() {
            state.stats.misses += 1;
            // driven by the spawned task or by `settled`
            let _fetch = self.inner.begin_fetch(&mut state, &key, definition);
        } else {
            state.stats.hits += 1;
            tracing::trace!(key = %key, "Query served from cache");
        }
        drop(state);

        Ok(QuerySubscription {
            client: self.clone(),
            key,
        })
    }

    /// Fetch `endpoint(arg)` into the cache without holding a subscription.
    /// The entry becomes eligible for eviction right away.
    pub async fn prefetch(&self, endpoint: &str, arg: Value) -> CacheResult<Arc<QueryState>> {
        let subscription = self.subscribe(endpoint, arg)?;
        Ok(subscription.settled().await)
    }

    /// Fetch an entry again even when it is fresh.
    ///
    /// A fetch already in flight for the entry is joined rather than
    /// duplicated, so there is never more than one transport call per key.
    pub async fn refetch(&self, endpoint: &str, arg: Value) -> CacheResult<Arc<QueryState>> {
        let definition = self.inner.registry.query_endpoint(endpoint)?;
        let key = QueryKey::new(endpoint, &arg);
        let fetch = {
            let mut state = self.inner.lock();
            let in_flight = state
                .entries
                .entry(key.clone())
                .or_insert_with(|| QueryEntry::new(arg))
                .pending
                .as_ref()
                .map(|pending| pending.future.clone());
            match in_flight {
                Some(fetch) => {
                    tracing::trace!(key = %key, "Refetch joined fetch in flight");
                    fetch
                }
                None => self.inner.begin_fetch(&mut state, &key, definition),
            }
        };
        Ok(fetch.await)
    }

    /// Current state of `endpoint(arg)`.
    ///
    /// Returns the same `Arc` for as long as the entry does not transition, and
    /// a shared uninitialized state for unknown keys.
    pub fn select(&self, endpoint: &str, arg: &Value) -> Arc<QueryState> {
        self.select_key(&QueryKey::new(endpoint, arg))
    }

    pub fn select_key(&self, key: &QueryKey) -> Arc<QueryState> {
        self.inner
            .lock()
            .entries
            .get(key)
            .map(|entry| Arc::clone(&entry.state))
            .unwrap_or_else(|| Arc::clone(&UNINITIALIZED))
    }

    /// Number of live subscriptions on `endpoint(arg)`.
    pub fn subscriber_count(&self, endpoint: &str, arg: &Value) -> usize {
        self.inner
            .lock()
            .entries
            .get(&QueryKey::new(endpoint, arg))
            .map_or(0, |entry| entry.subscribers)
    }

    /// Whether the entry is marked stale and waiting for a refetch.
    pub fn is_stale(&self, endpoint: &str, arg: &Value) -> bool {
        self.inner
            .lock()
            .entries
            .get(&QueryKey::new(endpoint, arg))
            .is_some_and(|entry| entry.stale)
    }

    pub fn contains(&self, endpoint: &str, arg: &Value) -> bool {
        self.inner
            .lock()
            .entries
            .contains_key(&QueryKey::new(endpoint, arg))
    }

    /// Tags currently provided by `endpoint(arg)`.
    pub fn provided_tags(&self, endpoint: &str, arg: &Value) -> BTreeSet<Tag> {
        self.inner
            .lock()
            .tags
            .tags_for(&QueryKey::new(endpoint, arg))
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock();
        CacheStats {
            entry_count: state.entries.len() as u64,
            ..state.stats.clone()
        }
    }

    /// Run a write against `endpoint`.
    ///
    /// The request is built and any optimistic patch is applied before this
    /// method returns, so readers see the speculative data before the returned
    /// future is first polled. On success the patch is committed and every
    /// entry providing one of the invalidated tags is refetched (live
    /// subscribers) or dropped (no subscribers); the future resolves once
    /// those refetches have settled. On failure the patch is rolled back and
    /// nothing is invalidated.
    pub fn mutate(
        &self,
        endpoint: &str,
        arg: Value,
    ) -> impl Future<Output = CacheResult<Value>> + Send + 'static {
        let prepared = self.prepare_mutation(endpoint, arg);
        let client = self.clone();
        async move {
            let prepared = prepared?;
            client.run_mutation(prepared).await
        }
    }

    fn prepare_mutation(&self, endpoint: &str, arg: Value) -> CacheResult<PreparedMutation> {
        let definition = self.inner.registry.mutation_endpoint(endpoint)?;
        let request = (definition.build_request)(&arg)?;
        let patch = definition
            .optimistic
            .and_then(|update| self.apply_optimistic(endpoint, &update, &arg));
        Ok(PreparedMutation {
            endpoint: endpoint.to_string(),
            definition,
            arg,
            request,
            patch,
        })
    }

    async fn run_mutation(&self, prepared: PreparedMutation) -> CacheResult<Value> {
        let PreparedMutation {
            endpoint,
            definition,
            arg,
            request,
            patch,
        } = prepared;

        tracing::debug!(endpoint = %endpoint, method = %request.method, path = %request.path, "Running mutation");
        match self.inner.transport.fetch(request).await {
            Ok(result) => {
                if let Some(patch) = patch {
                    patch.commit();
                }
                let tags = definition.tags(&result, &arg);
                self.invalidate_tags(&tags).await;
                Ok(result)
            }
            Err(source) => {
                tracing::warn!(endpoint = %endpoint, error = %source, "Mutation failed");
                if let Some(patch) = patch {
                    patch.rollback();
                }
                Err(MutationError { endpoint, source }.into())
            }
        }
    }

    /// Mark every entry providing one of `tags` stale.
    ///
    /// Entries with subscribers are refetched (when enabled in the config) and
    /// awaited; entries without subscribers are dropped. Returns the number of
    /// entries touched.
    pub async fn invalidate_tags(&self, tags: &[Tag]) -> usize {
        if tags.is_empty() {
            return 0;
        }

        let (touched, refetches) = {
            let mut state = self.inner.lock();
            let keys = state.tags.resolve(tags);
            let mut refetches = Vec::new();

            for key in &keys {
                let Some(entry) = state.entries.get_mut(key) else {
                    continue;
                };
                entry.stale = true;

                if entry.subscribers == 0 {
                    tracing::debug!(key = %key, "Dropping invalidated entry without subscribers");
                    state.remove_entry(key);
                } else if self.inner.config.refetch_on_invalidate {
                    match self.inner.registry.query_endpoint(&key.endpoint) {
                        Ok(definition) => {
                            refetches.push(self.inner.begin_fetch(&mut state, key, definition));
                        }
                        Err(e) => {
                            tracing::warn!(key = %key, error = %e, "Cannot refetch invalidated entry");
                        }
                    }
                }
            }

            state.stats.invalidations += keys.len() as u64;
            (keys.len(), refetches)
        };

        tracing::debug!(
            tags = ?tags.iter().map(Tag::to_string).collect::<Vec<_>>(),
            touched,
            refetching = refetches.len(),
            "Invalidated tags"
        );
        future::join_all(refetches).await;
        touched
    }

    /// Speculatively patch the target entry of `update`.
    ///
    /// Returns `None` when the entry has no data yet or the transform does not
    /// apply; the mutation then simply runs unpatched.
    fn apply_optimistic(
        &self,
        endpoint: &str,
        update: &OptimisticUpdate,
        arg: &Value,
    ) -> Option<OptimisticGuard> {
        let key = QueryKey::new(update.endpoint, &(update.target_arg)(arg));
        let mut guard = self.inner.lock();
        let state = &mut *guard;

        let patch_id = state.next_patch_id + 1;
        let entry = state.entries.get_mut(&key)?;
        let current = entry.state.data.clone()?;
        let Some(next) = entry.patches.apply(patch_id, update.apply, arg, &current) else {
            tracing::debug!(endpoint, key = %key, "Optimistic update did not apply");
            return None;
        };

        entry.state = Arc::new(entry.state.with_data(next));
        state.next_patch_id = patch_id;
        state.stats.optimistic_applied += 1;
        tracing::debug!(endpoint, key = %key, patch_id, "Applied optimistic update");

        Some(OptimisticGuard {
            client: self.clone(),
            key,
            patch_id,
            settled: false,
        })
    }

    fn commit_patch(&self, key: &QueryKey, patch_id: PatchId) -> PatchState {
        let mut state = self.inner.lock();
        match state.entries.get_mut(key) {
            Some(entry) => entry.patches.commit(patch_id),
            None => PatchState::Superseded,
        }
    }

    fn rollback_patch(&self, key: &QueryKey, patch_id: PatchId) -> PatchState {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let Some(entry) = state.entries.get_mut(key) else {
            return PatchState::Superseded;
        };
        match entry.patches.rollback(patch_id) {
            Some(data) => {
                entry.state = Arc::new(entry.state.with_data(data));
                state.stats.rollbacks += 1;
                tracing::debug!(key = %key, patch_id, "Rolled back optimistic update");
                PatchState::RolledBack
            }
            None => PatchState::Superseded,
        }
    }

    /// Evict idle entries whose grace period has elapsed.
    pub fn collect_garbage(&self) -> usize {
        self.collect_garbage_at(Instant::now())
    }

    /// [`collect_garbage`](Self::collect_garbage) with an explicit clock.
    pub fn collect_garbage_at(&self, now: Instant) -> usize {
        self.inner
            .lock()
            .evict_expired(now, self.inner.config.keep_unused_for)
    }

    /// Sweep idle entries every `eviction_interval` until the last client
    /// handle is dropped. Must be called from within a tokio runtime.
    pub fn spawn_eviction_task(&self) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        let period = self.inner.config.eviction_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(inner) = inner.upgrade() else {
                    tracing::debug!("Query client dropped, stopping eviction task");
                    break;
                };
                let evicted = inner
                    .lock()
                    .evict_expired(Instant::now(), inner.config.keep_unused_for);
                if evicted > 0 {
                    tracing::debug!(evicted, "Evicted idle query entries");
                }
            }
        })
    }

    fn retain(&self, key: &QueryKey) {
        let mut state = self.inner.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.subscribers += 1;
            entry.idle_since = None;
        }
    }

    fn pending_fetch(&self, key: &QueryKey) -> Option<SharedFetch> {
        self.inner
            .lock()
            .entries
            .get(key)
            .and_then(|entry| entry.pending.as_ref().map(|pending| pending.future.clone()))
    }
}

struct PreparedMutation {
    endpoint: String,
    definition: crate::endpoint::MutationEndpoint,
    arg: Value,
    request: RequestDescriptor,
    patch: Option<OptimisticGuard>,
}

/// One applied optimistic patch. Dropping it unresolved rolls it back, so a
/// cancelled mutation never leaves speculative data behind.
struct OptimisticGuard {
    client: QueryClient,
    key: QueryKey,
    patch_id: PatchId,
    settled: bool,
}

impl OptimisticGuard {
    fn commit(mut self) -> PatchState {
        self.settled = true;
        self.client.commit_patch(&self.key, self.patch_id)
    }

    fn rollback(mut self) -> PatchState {
        self.settled = true;
        self.client.rollback_patch(&self.key, self.patch_id)
    }
}

impl Drop for OptimisticGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.client.rollback_patch(&self.key, self.patch_id);
        }
    }
}

/// A live subscription to one query-cache entry.
///
/// Holding it keeps the entry from being evicted. Dropping it releases the
/// subscription without cancelling a fetch other subscribers are awaiting.
pub struct QuerySubscription {
    client: QueryClient,
    key: QueryKey,
}

impl QuerySubscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Current state. Stable `Arc` while the entry does not transition.
    pub fn state(&self) -> Arc<QueryState> {
        self.client.select_key(&self.key)
    }

    pub fn status(&self) -> crate::query::QueryStatus {
        self.state().status
    }

    pub fn data(&self) -> Option<Arc<QueryData>> {
        self.state().data.clone()
    }

    pub fn error(&self) -> Option<CacheError> {
        self.state().error.clone()
    }

    /// Wait until no fetch is in flight for this entry and return its state.
    ///
    /// If the fetch being awaited is superseded by a newer one, waits for the
    /// newer one too.
    pub async fn settled(&self) -> Arc<QueryState> {
        while let Some(fetch) = self.client.pending_fetch(&self.key) {
            fetch.await;
        }
        self.state()
    }

    /// Force a refetch of this entry.
    pub async fn refetch(&self) -> CacheResult<Arc<QueryState>> {
        let arg: Value = serde_json::from_str(&self.key.arg).map_err(|e| {
            CacheError::invalid_argument(&self.key.endpoint, e.to_string())
        })?;
        self.client.refetch(&self.key.endpoint, arg).await
    }
}

impl Clone for QuerySubscription {
    fn clone(&self) -> Self {
        self.client.retain(&self.key);
        Self {
            client: self.client.clone(),
            key: self.key.clone(),
        }
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        self.client.inner.release(&self.key);
    }
}

impl std::fmt::Debug for QuerySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySubscription")
            .field("key", &self.key)
            .finish()
    }
}
