//! STRATA Posts - the posts API on top of the STRATA cache.
//!
//! Declares the posts and users endpoints ([`endpoints::posts_registry`]),
//! the ingestion backfill for post collections, memoized post selectors, and
//! an HTTP transport plus the configuration and tracing setup used by the
//! `strata-posts` binary.

pub mod backfill;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod selectors;
pub mod telemetry;

use std::sync::Arc;

use strata_cache::{QueryClient, Transport};

pub use config::{ClientConfig, ConfigError};
pub use endpoints::posts_registry;
pub use error::PostsError;
pub use http::HttpTransport;

/// A cache client with every posts endpoint registered.
pub fn posts_client(transport: Arc<dyn Transport>, config: &ClientConfig) -> QueryClient {
    QueryClient::new(transport, posts_registry(), config.cache_config())
}
