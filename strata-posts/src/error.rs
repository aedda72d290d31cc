//! Error types for the posts client.

use strata_core::CacheError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum PostsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("Failed to initialize tracing: {0}")]
    Telemetry(String),
}
