//! Tier 1: process-local moka cache.
//!
//! Size-aware (weighed by vector bytes), short TTL. moka's TinyLFU
//! handles admission and eviction for this tier; the configurable
//! strategies apply to tier 2, which this crate evicts by hand.

use std::time::Duration;

use moka::sync::Cache;

use quarry_core::config::CacheTierConfig;

use super::CachedEmbedding;

pub struct L1MemoryCache {
    cache: Cache<String, CachedEmbedding>,
}

impl L1MemoryCache {
    pub fn new(cfg: &CacheTierConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(cfg.max_bytes)
            .weigher(|_key: &String, value: &CachedEmbedding| {
                (value.vector.len() * 4 + 64).min(u32::MAX as usize) as u32
            })
            .time_to_live(Duration::from_secs(cfg.ttl_secs.max(1)))
            .support_invalidation_closures()
            .build();
        Self { cache }
    }

    pub fn get(&self, key: &str) -> Option<CachedEmbedding> {
        self.cache.get(key)
    }

    pub fn insert(&self, key: String, value: CachedEmbedding) {
        self.cache.insert(key, value);
    }

    pub fn invalidate(&self, key: &str) {
        self.cache.invalidate(key);
    }

    /// Remove entries matching a predicate (glob/tag invalidation).
    pub fn invalidate_where<F>(&self, predicate: F)
    where
        F: Fn(&str, &CachedEmbedding) -> bool + Send + Sync + 'static,
    {
        // moka applies the predicate lazily; matched entries stop being
        // returned immediately.
        let _ = self
            .cache
            .invalidate_entries_if(move |k, v| predicate(k, v));
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn weighted_size(&self) -> u64 {
        self.cache.weighted_size()
    }
}
