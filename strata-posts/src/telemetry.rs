//! Tracing bootstrap.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::PostsError;

pub const DEFAULT_FILTER: &str = "strata_cache=info,strata_posts=info,warn";

/// Install a JSON `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `filter`, which falls back to
/// [`DEFAULT_FILTER`]. Fails if a global subscriber is already set.
pub fn init_tracing(filter: Option<&str>) -> Result<(), PostsError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| PostsError::Telemetry(e.to_string()))?;

    tracing::debug!(filter = filter.unwrap_or(DEFAULT_FILTER), "Tracing initialized");
    Ok(())
}
