//! Tier-3 (database) cache behaviour through a real storage engine:
//! write-through, read-through promotion, and cascading invalidation.

use std::sync::Arc;

use quarry_core::config::{CacheConfig, CacheTierConfig};
use quarry_core::traits::DocumentStorage;
use quarry_embeddings::cache::CacheKey;
use quarry_embeddings::{CacheCoordinator, CachedEmbedding};
use quarry_storage::StorageEngine;

fn value(dims: usize) -> CachedEmbedding {
    CachedEmbedding {
        vector: vec![0.125; dims],
        provider_id: "local-hash".into(),
        model_id: "term-hash-v1".into(),
        dimensions: dims,
        tags: vec!["docs".into()],
    }
}

fn key(text_hash: &str) -> CacheKey {
    CacheKey::compute(text_hash, "local-hash", "term-hash-v1", 384, "fp", None)
}

fn database_only() -> CacheConfig {
    CacheConfig {
        memory: CacheTierConfig {
            enabled: false,
            ..CacheTierConfig::default()
        },
        persistent: CacheTierConfig {
            enabled: false,
            ..CacheTierConfig::default()
        },
        ..CacheConfig::default()
    }
}

#[test]
fn database_tier_roundtrip() {
    let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
    let cache = CacheCoordinator::new(
        database_only(),
        None,
        Some(storage.clone() as Arc<dyn DocumentStorage>),
    );

    let k = key("t3");
    cache.put(&k, &value(384));
    let (got, tier) = cache.get(&k).unwrap();
    assert_eq!(got.vector.len(), 384);
    assert_eq!(tier, quarry_embeddings::cache::CacheTier::Database);
    assert_eq!(cache.stats().database.writes, 1);
}

#[test]
fn database_hit_promotes_into_faster_tiers() {
    let storage = Arc::new(StorageEngine::open_in_memory().unwrap());

    // Writer shares only the database tier with the reader.
    let writer = CacheCoordinator::new(
        database_only(),
        None,
        Some(storage.clone() as Arc<dyn DocumentStorage>),
    );
    let k = key("promoted");
    writer.put(&k, &value(384));

    let reader = CacheCoordinator::new(
        CacheConfig::default(),
        None,
        Some(storage.clone() as Arc<dyn DocumentStorage>),
    );
    let (_, tier) = reader.get(&k).unwrap();
    assert_eq!(tier, quarry_embeddings::cache::CacheTier::Database);

    // Promotion happened: the next read answers from memory.
    let (_, tier) = reader.get(&k).unwrap();
    assert_eq!(tier, quarry_embeddings::cache::CacheTier::Memory);
}

#[test]
fn tag_invalidation_reaches_the_database_tier() {
    let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
    let cache = CacheCoordinator::new(
        database_only(),
        None,
        Some(storage.clone() as Arc<dyn DocumentStorage>),
    );

    cache.put(&key("one"), &value(384));
    cache.put(&key("two"), &value(384));
    let removed = cache.invalidate("tag:docs").unwrap();
    assert_eq!(removed, 2);
    assert!(cache.get(&key("one")).is_none());
}
