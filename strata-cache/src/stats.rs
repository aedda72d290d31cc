//! Cache usage counters.

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Subscriptions served from an existing entry without a new fetch.
    pub hits: u64,
    /// Subscriptions that had to start a fetch.
    pub misses: u64,
    /// Transport calls issued for queries.
    pub fetches: u64,
    /// Entries touched by tag invalidation.
    pub invalidations: u64,
    /// Entries removed for lack of subscribers.
    pub evictions: u64,
    /// Optimistic patches applied.
    pub optimistic_applied: u64,
    /// Optimistic patches rolled back.
    pub rollbacks: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Share of subscriptions answered without a transport call, in `0.0..=1.0`.
    /// Zero before the first subscription.
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            served => self.hits as f64 / served as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_ignores_fetch_and_patch_counters() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            fetches: 7,
            optimistic_applied: 2,
            rollbacks: 2,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);

        // refetches and invalidations count as fetches, not misses
        let refetching = CacheStats {
            fetches: 5,
            invalidations: 4,
            ..Default::default()
        };
        assert_eq!(refetching.hit_rate(), 0.0);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
