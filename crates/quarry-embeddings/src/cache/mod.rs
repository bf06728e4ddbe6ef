//! Three-tier read-through / write-through embedding cache.
//!
//! Tier 1: moka in-memory (~5 min TTL). Tier 2: SQLite side-file
//! (~24 h). Tier 3: the main database's `embedding_cache` table (~7 d).
//! Reads probe 1→2→3 and promote hits into faster tiers; writes fan out
//! to every tier not excluded. Tier 2/3 failures degrade the cache and
//! are never propagated to the request that triggered them.

pub mod codec;
pub mod key;
pub mod l1_memory;
pub mod l2_disk;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use quarry_core::config::CacheConfig;
use quarry_core::errors::QuarryResult;
use quarry_core::models::CacheRecord;
use quarry_core::traits::DocumentStorage;

pub use key::CacheKey;
pub use l1_memory::L1MemoryCache;
pub use l2_disk::L2DiskCache;

/// The cached value: vector plus provenance and tags.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEmbedding {
    pub vector: Vec<f32>,
    pub provider_id: String,
    pub model_id: String,
    pub dimensions: usize,
    pub tags: Vec<String>,
}

/// Which tier served a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Memory,
    Persistent,
    Database,
}

#[derive(Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    access_time_us: AtomicU64,
    accesses: AtomicU64,
}

impl TierCounters {
    fn snapshot(&self) -> TierStats {
        let accesses = self.accesses.load(Ordering::Relaxed);
        let total_us = self.access_time_us.load(Ordering::Relaxed);
        TierStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            avg_access_us: if accesses == 0 { 0.0 } else { total_us as f64 / accesses as f64 },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub avg_access_us: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory: TierStats,
    pub persistent: TierStats,
    pub database: TierStats,
}

/// Coordinates the three tiers. Owns tiers 1 and 2 outright; tier 3 is a
/// handle into the storage engine.
pub struct CacheCoordinator {
    cfg: CacheConfig,
    l1: Option<L1MemoryCache>,
    l2: Option<L2DiskCache>,
    l3: Option<Arc<dyn DocumentStorage>>,
    memory_counters: TierCounters,
    persistent_counters: TierCounters,
    database_counters: TierCounters,
}

impl CacheCoordinator {
    /// Build the tier stack. A tier that fails to open is disabled, not
    /// fatal: the cache degrades to the remaining tiers.
    pub fn new(
        cfg: CacheConfig,
        db_path: Option<&Path>,
        storage: Option<Arc<dyn DocumentStorage>>,
    ) -> Self {
        let l1 = cfg.memory.enabled.then(|| L1MemoryCache::new(&cfg.memory));

        let l2 = if cfg.persistent.enabled {
            let opened = match db_path {
                Some(path) => L2DiskCache::open(path, cfg.persistent.clone()),
                None => L2DiskCache::open_in_memory(cfg.persistent.clone()),
            };
            match opened {
                Ok(tier) => Some(tier),
                Err(e) => {
                    warn!(error = %e, "persistent cache tier unavailable, degrading");
                    None
                }
            }
        } else {
            None
        };

        let l3 = if cfg.database.enabled { storage } else { None };

        Self {
            cfg,
            l1,
            l2,
            l3,
            memory_counters: TierCounters::default(),
            persistent_counters: TierCounters::default(),
            database_counters: TierCounters::default(),
        }
    }

    pub fn salt(&self) -> Option<&str> {
        self.cfg.key_salt.as_deref()
    }

    /// Read-through lookup. A hit at a slower tier is promoted into every
    /// faster tier with the faster tier's TTL. Callers cannot distinguish
    /// absent from expired.
    pub fn get(&self, key: &CacheKey) -> Option<(CachedEmbedding, CacheTier)> {
        let now = Utc::now();

        if let Some(l1) = &self.l1 {
            let t0 = Instant::now();
            let found = l1.get(key.as_str());
            self.record_access(CacheTier::Memory, t0, found.is_some());
            if let Some(value) = found {
                return Some((value, CacheTier::Memory));
            }
        }

        if let Some(l2) = &self.l2 {
            let t0 = Instant::now();
            match l2.get(key.as_str(), now) {
                Ok(Some(value)) => {
                    self.record_access(CacheTier::Persistent, t0, true);
                    self.promote_to_l1(key, &value);
                    return Some((value, CacheTier::Persistent));
                }
                Ok(None) => self.record_access(CacheTier::Persistent, t0, false),
                Err(e) => {
                    self.record_access(CacheTier::Persistent, t0, false);
                    debug!(error = %e, "persistent tier read failed");
                }
            }
        }

        if let Some(l3) = &self.l3 {
            let t0 = Instant::now();
            match l3.cache_get(key.as_str(), now) {
                Ok(Some(record)) => {
                    self.record_access(CacheTier::Database, t0, true);
                    match codec::decode(&record.blob, record.compressed) {
                        Ok(vector) => {
                            let value = CachedEmbedding {
                                vector,
                                provider_id: record.provider_id,
                                model_id: record.model_id,
                                dimensions: record.dimensions,
                                tags: record.tags,
                            };
                            self.promote_to_l2(key, &value);
                            self.promote_to_l1(key, &value);
                            return Some((value, CacheTier::Database));
                        }
                        Err(e) => {
                            debug!(error = %e, "database tier blob decode failed");
                        }
                    }
                }
                Ok(None) => self.record_access(CacheTier::Database, t0, false),
                Err(e) => {
                    self.record_access(CacheTier::Database, t0, false);
                    debug!(error = %e, "database tier read failed");
                }
            }
        }

        None
    }

    /// Write-through to all tiers. Tier failures are logged and swallowed;
    /// the write never blocks or fails the response that produced it.
    pub fn put(&self, key: &CacheKey, value: &CachedEmbedding) {
        let now = Utc::now();

        if let Some(l1) = &self.l1 {
            l1.insert(key.as_str().to_string(), value.clone());
            self.memory_counters.writes.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.put(key.as_str(), value, now) {
                debug!(error = %e, "persistent tier write failed");
            } else {
                self.persistent_counters.writes.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(l3) = &self.l3 {
            let (blob, compressed) = codec::encode(&value.vector, self.cfg.database.compress);
            let record = CacheRecord {
                key: key.as_str().to_string(),
                blob,
                compressed,
                provider_id: value.provider_id.clone(),
                model_id: value.model_id.clone(),
                dimensions: value.dimensions,
                tags: value.tags.clone(),
                created_at: now,
                expires_at: Some(
                    now + chrono::Duration::seconds(self.cfg.database.ttl_secs.max(1) as i64),
                ),
                last_used_at: now,
                hit_count: 0,
            };
            if let Err(e) = l3.cache_put(&record) {
                debug!(error = %e, "database tier write failed");
            } else {
                self.database_counters.writes.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Invalidate by exact key, glob (`*`), or `tag:<label>`, cascading
    /// across tiers best-effort. Returns entries removed from durable
    /// tiers (tier 1 removal counts are not observable through moka).
    pub fn invalidate(&self, pattern: &str) -> QuarryResult<usize> {
        let mut removed = 0;

        if let Some(l1) = &self.l1 {
            if let Some(label) = pattern.strip_prefix("tag:") {
                let label = label.to_string();
                l1.invalidate_where(move |_, v| v.tags.iter().any(|t| t == &label));
            } else if pattern.contains('*') {
                let regex = glob_to_matcher(pattern);
                l1.invalidate_where(move |k, _| regex(k));
            } else {
                l1.invalidate(pattern);
            }
        }

        if let Some(l2) = &self.l2 {
            let result = if let Some(label) = pattern.strip_prefix("tag:") {
                l2.invalidate_tag(label)
            } else if pattern.contains('*') {
                l2.invalidate_like(&glob_to_like(pattern))
            } else {
                l2.invalidate_exact(pattern)
            };
            match result {
                Ok(n) => removed += n,
                Err(e) => warn!(error = %e, "persistent tier invalidation failed"),
            }
        }

        if let Some(l3) = &self.l3 {
            match l3.cache_invalidate(pattern) {
                Ok(n) => removed += n,
                Err(e) => warn!(error = %e, "database tier invalidation failed"),
            }
        }

        Ok(removed)
    }

    /// Periodic expired-entry trim for the durable tiers.
    pub fn trim_expired(&self) {
        let now = Utc::now();
        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.trim_expired(now) {
                debug!(error = %e, "persistent tier trim failed");
            }
        }
        if let Some(l3) = &self.l3 {
            if let Err(e) = l3.cache_trim_expired(now) {
                debug!(error = %e, "database tier trim failed");
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory: self.memory_counters.snapshot(),
            persistent: self.persistent_counters.snapshot(),
            database: self.database_counters.snapshot(),
        }
    }

    fn promote_to_l1(&self, key: &CacheKey, value: &CachedEmbedding) {
        if let Some(l1) = &self.l1 {
            l1.insert(key.as_str().to_string(), value.clone());
        }
    }

    fn promote_to_l2(&self, key: &CacheKey, value: &CachedEmbedding) {
        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.put(key.as_str(), value, Utc::now()) {
                debug!(error = %e, "promotion to persistent tier failed");
            }
        }
    }

    fn record_access(&self, tier: CacheTier, t0: Instant, hit: bool) {
        let counters = match tier {
            CacheTier::Memory => &self.memory_counters,
            CacheTier::Persistent => &self.persistent_counters,
            CacheTier::Database => &self.database_counters,
        };
        counters.accesses.fetch_add(1, Ordering::Relaxed);
        counters
            .access_time_us
            .fetch_add(t0.elapsed().as_micros() as u64, Ordering::Relaxed);
        if hit {
            counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// `*` glob to LIKE pattern (durable tiers).
fn glob_to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' => out.push('%'),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}

/// `*` glob to a closure matcher (tier 1).
fn glob_to_matcher(pattern: &str) -> impl Fn(&str) -> bool + use<> {
    let parts: Vec<String> = pattern.split('*').map(str::to_string).collect();
    let pattern_ends_with_star = pattern.ends_with('*');
    move |key: &str| {
        let mut remainder = key;
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                continue;
            }
            match remainder.find(part.as_str()) {
                Some(pos) => {
                    // The first part must anchor at the start.
                    if i == 0 && pos != 0 {
                        return false;
                    }
                    remainder = &remainder[pos + part.len()..];
                }
                None => return false,
            }
        }
        // The last part must anchor at the end.
        if let Some(last) = parts.last() {
            if !last.is_empty() && !pattern_ends_with_star && !key.ends_with(last.as_str()) {
                return false;
            }
        }
        true
    }
}
