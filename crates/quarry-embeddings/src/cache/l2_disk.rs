//! Tier 2: persistent key-value cache in a dedicated SQLite side-file
//! (`<db>.embcache.db`). Survives process restarts; scoped to the engine's
//! database the way an origin-scoped store is scoped to its origin.
//!
//! This tier owns its eviction: when a cap is crossed, it synchronously
//! evicts down to ~80% of the cap inside the offending `put`, by the
//! configured strategy.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use quarry_core::config::defaults::EVICTION_TARGET_RATIO;
use quarry_core::config::{CacheTierConfig, EvictionStrategy};
use quarry_core::errors::{CacheError, QuarryResult};

use super::codec;
use super::CachedEmbedding;

pub struct L2DiskCache {
    conn: Mutex<Connection>,
    cfg: CacheTierConfig,
}

fn tier_err(e: impl ToString) -> CacheError {
    CacheError::TierUnavailable {
        tier: "persistent",
        reason: e.to_string(),
    }
}

impl L2DiskCache {
    /// Open (or create) the side-file next to the main database.
    pub fn open(db_path: &Path, cfg: CacheTierConfig) -> QuarryResult<Self> {
        let cache_path = db_path.with_extension("embcache.db");
        let conn = Connection::open(&cache_path).map_err(tier_err)?;
        Self::init(conn, cfg, Some(&cache_path))
    }

    /// In-memory variant for tests and in-memory engines.
    pub fn open_in_memory(cfg: CacheTierConfig) -> QuarryResult<Self> {
        let conn = Connection::open_in_memory().map_err(tier_err)?;
        Self::init(conn, cfg, None)
    }

    fn init(conn: Connection, cfg: CacheTierConfig, path: Option<&Path>) -> QuarryResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS embedding_cache (
                key TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                compressed INTEGER NOT NULL DEFAULT 0,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                priority INTEGER NOT NULL DEFAULT 0,
                access_count INTEGER NOT NULL DEFAULT 0,
                byte_size INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT,
                last_used_at TEXT NOT NULL
             );
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(tier_err)?;
        if let Some(p) = path {
            debug!(path = %p.display(), "L2 disk cache opened");
        }
        Ok(Self {
            conn: Mutex::new(conn),
            cfg,
        })
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> QuarryResult<Option<CachedEmbedding>> {
        let conn = self.conn.lock().map_err(tier_err)?;
        let row = conn
            .query_row(
                "SELECT embedding, compressed, provider, model, dimensions, tags, expires_at
                 FROM embedding_cache WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(tier_err)?;

        let Some((blob, compressed, provider_id, model_id, dimensions, tags, expires_at)) = row
        else {
            return Ok(None);
        };

        if let Some(raw) = expires_at {
            let expiry = DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(tier_err)?;
            if expiry <= now {
                // Expired entries read as absent; trim removes them later.
                return Ok(None);
            }
        }

        conn.execute(
            "UPDATE embedding_cache
             SET access_count = access_count + 1, last_used_at = ?1
             WHERE key = ?2",
            params![now.to_rfc3339(), key],
        )
        .map_err(tier_err)?;

        let vector = codec::decode(&blob, compressed)?;
        Ok(Some(CachedEmbedding {
            vector,
            provider_id,
            model_id,
            dimensions: dimensions as usize,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
        }))
    }

    pub fn put(&self, key: &str, value: &CachedEmbedding, now: DateTime<Utc>) -> QuarryResult<()> {
        let (blob, compressed) = codec::encode(&value.vector, self.cfg.compress);
        let tags = serde_json::to_string(&value.tags).unwrap_or_else(|_| "[]".into());
        let expires_at = (now + Duration::seconds(self.cfg.ttl_secs.max(1) as i64)).to_rfc3339();
        let byte_size = blob.len() as i64;

        let conn = self.conn.lock().map_err(tier_err)?;
        conn.execute(
            "INSERT OR REPLACE INTO embedding_cache
                (key, embedding, compressed, provider, model, dimensions, tags,
                 priority, access_count, byte_size, created_at, expires_at, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, ?8, ?9, ?10, ?9)",
            params![
                key,
                blob,
                compressed,
                value.provider_id,
                value.model_id,
                value.dimensions as i64,
                tags,
                byte_size,
                now.to_rfc3339(),
                expires_at,
            ],
        )
        .map_err(tier_err)?;

        self.evict_if_over_cap(&conn, now)?;
        Ok(())
    }

    /// Synchronous eviction down to ~80% of whichever cap was crossed.
    fn evict_if_over_cap(&self, conn: &Connection, now: DateTime<Utc>) -> QuarryResult<()> {
        let (count, bytes): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(byte_size), 0) FROM embedding_cache",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(tier_err)?;

        let over_entries = (count as u64) > self.cfg.max_entries;
        let over_bytes = (bytes as u64) > self.cfg.max_bytes;
        if !over_entries && !over_bytes {
            return Ok(());
        }

        let target_entries = (self.cfg.max_entries as f64 * EVICTION_TARGET_RATIO) as u64;
        let target_bytes = (self.cfg.max_bytes as f64 * EVICTION_TARGET_RATIO) as u64;

        let order = self.eviction_order(now);
        let mut stmt = conn
            .prepare(&format!(
                "SELECT key, byte_size FROM embedding_cache ORDER BY {order}"
            ))
            .map_err(tier_err)?;
        let victims = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(tier_err)?;

        let mut remaining_count = count as u64;
        let mut remaining_bytes = bytes as u64;
        let mut to_remove = Vec::new();
        for victim in victims {
            let (key, size) = victim.map_err(tier_err)?;
            if remaining_count <= target_entries && remaining_bytes <= target_bytes {
                break;
            }
            remaining_count -= 1;
            remaining_bytes = remaining_bytes.saturating_sub(size as u64);
            to_remove.push(key);
        }
        drop(stmt);

        for key in &to_remove {
            conn.execute("DELETE FROM embedding_cache WHERE key = ?1", params![key])
                .map_err(tier_err)?;
        }
        if !to_remove.is_empty() {
            debug!(evicted = to_remove.len(), "L2 eviction pass");
        }
        Ok(())
    }

    /// Victim ordering per configured strategy (worst candidates first).
    fn eviction_order(&self, now: DateTime<Utc>) -> String {
        match self.cfg.eviction {
            EvictionStrategy::Lru => "last_used_at ASC".to_string(),
            EvictionStrategy::Lfu => "access_count ASC, last_used_at ASC".to_string(),
            EvictionStrategy::PriorityWeighted => {
                "priority ASC, last_used_at ASC".to_string()
            }
            EvictionStrategy::Hybrid => {
                // score = α·priority + β·access_count − γ·age − δ·bytes;
                // lowest score evicts first.
                let w = self.cfg.hybrid_weights;
                format!(
                    "({a} * priority + {b} * access_count \
                     - {g} * (julianday('{now}') - julianday(created_at)) * 86400.0 \
                     - {d} * byte_size) ASC",
                    a = w.priority,
                    b = w.access_count,
                    g = w.age_seconds,
                    d = w.bytes,
                    now = now.to_rfc3339(),
                )
            }
        }
    }

    pub fn invalidate_exact(&self, key: &str) -> QuarryResult<usize> {
        let conn = self.conn.lock().map_err(tier_err)?;
        conn.execute("DELETE FROM embedding_cache WHERE key = ?1", params![key])
            .map_err(|e| tier_err(e).into())
    }

    pub fn invalidate_like(&self, like: &str) -> QuarryResult<usize> {
        let conn = self.conn.lock().map_err(tier_err)?;
        conn.execute(
            "DELETE FROM embedding_cache WHERE key LIKE ?1 ESCAPE '\\'",
            params![like],
        )
        .map_err(|e| tier_err(e).into())
    }

    pub fn invalidate_tag(&self, label: &str) -> QuarryResult<usize> {
        let conn = self.conn.lock().map_err(tier_err)?;
        conn.execute(
            "DELETE FROM embedding_cache WHERE tags LIKE ?1",
            params![format!("%\"{}\"%", label.replace('%', "").replace('_', ""))],
        )
        .map_err(|e| tier_err(e).into())
    }

    pub fn trim_expired(&self, now: DateTime<Utc>) -> QuarryResult<usize> {
        let conn = self.conn.lock().map_err(tier_err)?;
        conn.execute(
            "DELETE FROM embedding_cache WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now.to_rfc3339()],
        )
        .map_err(|e| tier_err(e).into())
    }

    pub fn entry_count(&self) -> QuarryResult<u64> {
        let conn = self.conn.lock().map_err(tier_err)?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM embedding_cache", [], |row| row.get(0))
            .map_err(tier_err)?;
        Ok(count as u64)
    }

    pub fn bytes_used(&self) -> QuarryResult<u64> {
        let conn = self.conn.lock().map_err(tier_err)?;
        let bytes: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(byte_size), 0) FROM embedding_cache",
                [],
                |row| row.get(0),
            )
            .map_err(tier_err)?;
        Ok(bytes as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dims: usize, tag: &str) -> CachedEmbedding {
        CachedEmbedding {
            vector: vec![0.25; dims],
            provider_id: "local-hash".into(),
            model_id: "m".into(),
            dimensions: dims,
            tags: vec![tag.into()],
        }
    }

    fn tier(cfg: CacheTierConfig) -> L2DiskCache {
        L2DiskCache::open_in_memory(cfg).unwrap()
    }

    #[test]
    fn roundtrip() {
        let cache = tier(CacheTierConfig::default());
        let now = Utc::now();
        cache.put("k", &entry(16, "docs"), now).unwrap();
        let got = cache.get("k", now).unwrap().unwrap();
        assert_eq!(got.vector, vec![0.25; 16]);
        assert_eq!(got.tags, vec!["docs".to_string()]);
    }

    #[test]
    fn compressed_roundtrip() {
        let cfg = CacheTierConfig {
            compress: true,
            ..CacheTierConfig::default()
        };
        let cache = tier(cfg);
        let now = Utc::now();
        cache.put("k", &entry(384, "docs"), now).unwrap();
        assert_eq!(cache.get("k", now).unwrap().unwrap().vector.len(), 384);
    }

    #[test]
    fn ttl_expiry_reads_absent() {
        let cfg = CacheTierConfig {
            ttl_secs: 60,
            ..CacheTierConfig::default()
        };
        let cache = tier(cfg);
        let now = Utc::now();
        cache.put("k", &entry(4, "docs"), now).unwrap();
        assert!(cache.get("k", now).unwrap().is_some());
        let later = now + Duration::seconds(120);
        assert!(cache.get("k", later).unwrap().is_none());
        assert_eq!(cache.trim_expired(later).unwrap(), 1);
    }

    #[test]
    fn entry_cap_evicts_to_target() {
        let cfg = CacheTierConfig {
            max_entries: 10,
            ..CacheTierConfig::default()
        };
        let cache = tier(cfg);
        let now = Utc::now();
        for i in 0..12 {
            cache
                .put(&format!("k{i}"), &entry(4, "docs"), now + Duration::seconds(i))
                .unwrap();
        }
        let count = cache.entry_count().unwrap();
        assert!(count <= 10, "cap respected after eviction, got {count}");
        assert!(count >= 7, "evicts toward 80%, not to zero, got {count}");
        // LRU: the most recently written keys survive.
        assert!(cache.get("k11", now + Duration::seconds(13)).unwrap().is_some());
    }

    #[test]
    fn tag_invalidation() {
        let cache = tier(CacheTierConfig::default());
        let now = Utc::now();
        cache.put("a", &entry(4, "docs"), now).unwrap();
        cache.put("b", &entry(4, "other"), now).unwrap();
        assert_eq!(cache.invalidate_tag("docs").unwrap(), 1);
        assert!(cache.get("a", now).unwrap().is_none());
        assert!(cache.get("b", now).unwrap().is_some());
    }

    #[test]
    fn lfu_prefers_to_evict_cold_entries() {
        let cfg = CacheTierConfig {
            max_entries: 2,
            eviction: EvictionStrategy::Lfu,
            ..CacheTierConfig::default()
        };
        let cache = tier(cfg);
        let now = Utc::now();
        cache.put("hot", &entry(4, "t"), now).unwrap();
        cache.put("cold", &entry(4, "t"), now).unwrap();
        // Warm up "hot".
        for _ in 0..5 {
            cache.get("hot", now).unwrap();
        }
        cache.put("new", &entry(4, "t"), now + Duration::seconds(1)).unwrap();
        assert!(cache.get("hot", now + Duration::seconds(2)).unwrap().is_some());
    }
}
