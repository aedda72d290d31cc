//! Cache configuration.

use std::time::Duration;

/// Configuration for the query client.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long an entry with no subscribers is kept before eviction.
    pub keep_unused_for: Duration,
    /// How often the background eviction task sweeps idle entries.
    pub eviction_interval: Duration,
    /// Whether invalidated entries with live subscribers are refetched
    /// immediately. When false they are only marked stale and refetched on the
    /// next subscription.
    pub refetch_on_invalidate: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            keep_unused_for: Duration::from_secs(60),
            eviction_interval: Duration::from_secs(30),
            refetch_on_invalidate: true,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the eviction grace period for unsubscribed entries.
    pub fn with_keep_unused_for(mut self, duration: Duration) -> Self {
        self.keep_unused_for = duration;
        self
    }

    /// Set the background sweep interval.
    pub fn with_eviction_interval(mut self, duration: Duration) -> Self {
        self.eviction_interval = duration;
        self
    }

    /// Enable or disable immediate refetch of invalidated entries.
    pub fn with_refetch_on_invalidate(mut self, enabled: bool) -> Self {
        self.refetch_on_invalidate = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.keep_unused_for, Duration::from_secs(60));
        assert_eq!(config.eviction_interval, Duration::from_secs(30));
        assert!(config.refetch_on_invalidate);
    }

    #[test]
    fn test_cache_config_builder() {
        let config = CacheConfig::new()
            .with_keep_unused_for(Duration::from_secs(5))
            .with_eviction_interval(Duration::from_millis(250))
            .with_refetch_on_invalidate(false);

        assert_eq!(config.keep_unused_for, Duration::from_secs(5));
        assert_eq!(config.eviction_interval, Duration::from_millis(250));
        assert!(!config.refetch_on_invalidate);
    }
}
