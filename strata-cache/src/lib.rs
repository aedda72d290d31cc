//! STRATA Cache - normalized query cache with tag invalidation.
//!
//! The engine keeps one entry per `(endpoint, argument)` pair, stores fetched
//! collections as normalized [`EntitySnapshot`]s, and keeps entries coherent
//! across writes:
//!
//! - queries declare the [`Tag`]s they provide, mutations the tags they
//!   invalidate, and the [`TagIndex`] maps one onto the other;
//! - mutations may patch a cached entry optimistically before the write
//!   settles; a failed write restores the entry exactly ([`PatchStack`]).
//!
//! Every entry state is an immutable `Arc<QueryState>` that is swapped on
//! each transition, so readers can memoize on pointer identity.
//!
//! # Example
//!
//! ```ignore
//! let client = QueryClient::new(transport, registry, CacheConfig::default());
//!
//! let posts = client.query("getPosts", Value::Null).await?;
//! let ids = select_all_ids(&posts.state()).to_vec();
//!
//! // Invalidates {Post, LIST}; the live subscription above is refetched.
//! client.mutate("addNewPost", json!({"title": "hi", "userId": "1"})).await?;
//! ```

pub mod client;
pub mod config;
pub mod endpoint;
pub mod entity_store;
pub mod optimistic;
pub mod query;
pub mod selectors;
pub mod stats;
pub mod tag_index;
pub mod transport;

pub use client::{QueryClient, QuerySubscription};
pub use config::CacheConfig;
pub use endpoint::{
    Endpoint, EndpointRegistry, InvalidationProvider, MutationEndpoint, OptimisticUpdate,
    QueryEndpoint, RequestBuilder, ResponseShaper, TagProvider,
};
pub use entity_store::{EntityAdapter, EntitySnapshot, SortComparer};
pub use optimistic::{PatchFn, PatchId, PatchStack, PatchState};
pub use query::{QueryData, QueryState, QueryStatus};
pub use selectors::{
    select_all_entities, select_all_ids, select_by_id, select_snapshot, select_total,
    MemoSelector,
};
pub use stats::CacheStats;
pub use tag_index::TagIndex;
pub use transport::Transport;

pub use strata_core::{
    CacheError, CacheResult, EntityId, MutationError, QueryKey, Record, RequestDescriptor,
    ShapingError, Tag, TagId, TransportError,
};
