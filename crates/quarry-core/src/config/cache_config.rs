use serde::{Deserialize, Serialize};

use super::defaults;

/// Eviction policy for a cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvictionStrategy {
    #[default]
    Lru,
    Lfu,
    PriorityWeighted,
    /// `α·priority + β·access_count − γ·age_seconds − δ·bytes`.
    Hybrid,
}

/// Coefficients for the hybrid eviction score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridEvictionWeights {
    pub priority: f64,
    pub access_count: f64,
    pub age_seconds: f64,
    pub bytes: f64,
}

impl Default for HybridEvictionWeights {
    fn default() -> Self {
        Self {
            priority: 1.0,
            access_count: 0.5,
            age_seconds: 0.01,
            bytes: 0.0001,
        }
    }
}

/// Configuration of a single cache tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTierConfig {
    pub enabled: bool,
    pub max_entries: u64,
    pub max_bytes: u64,
    pub ttl_secs: u64,
    pub eviction: EvictionStrategy,
    pub hybrid_weights: HybridEvictionWeights,
    /// zstd-compress stored vectors (tiers 2 and 3 only).
    pub compress: bool,
}

impl Default for CacheTierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: defaults::DEFAULT_MEMORY_MAX_ENTRIES,
            max_bytes: defaults::DEFAULT_MEMORY_MAX_BYTES,
            ttl_secs: defaults::DEFAULT_MEMORY_TTL_SECS,
            eviction: EvictionStrategy::Lru,
            hybrid_weights: HybridEvictionWeights::default(),
            compress: false,
        }
    }
}

/// Three-tier cache configuration. Each tier carries explicit defaults;
/// the coordinator composes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub memory: CacheTierConfig,
    pub persistent: CacheTierConfig,
    pub database: CacheTierConfig,
    pub cleanup_interval_secs: u64,
    /// Optional salt folded into every cache key.
    pub key_salt: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory: CacheTierConfig::default(),
            persistent: CacheTierConfig {
                max_entries: defaults::DEFAULT_PERSISTENT_MAX_ENTRIES,
                max_bytes: defaults::DEFAULT_PERSISTENT_MAX_BYTES,
                ttl_secs: defaults::DEFAULT_PERSISTENT_TTL_SECS,
                compress: true,
                ..CacheTierConfig::default()
            },
            database: CacheTierConfig {
                ttl_secs: defaults::DEFAULT_DATABASE_TTL_SECS,
                ..CacheTierConfig::default()
            },
            cleanup_interval_secs: defaults::DEFAULT_CLEANUP_INTERVAL_SECS,
            key_salt: None,
        }
    }
}
