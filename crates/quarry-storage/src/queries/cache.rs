//! Tier-3 embedding cache table queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use quarry_core::errors::{storage_error::to_storage_err, QuarryResult};
use quarry_core::models::CacheRecord;

use crate::codec::{parse_rfc3339, to_rfc3339};

/// Expiry-checked lookup. A hit bumps `hit_count` and `last_used_at`; an
/// expired row is treated as absent (trim removes it later).
pub fn cache_get(
    conn: &Connection,
    key: &str,
    now: DateTime<Utc>,
) -> QuarryResult<Option<CacheRecord>> {
    let row = conn
        .query_row(
            "SELECT key, embedding, provider, model, dimensions, compressed, tags,
                    created_at, expires_at, last_used_at, hit_count
             FROM embedding_cache WHERE key = ?1",
            params![key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, i64>(10)?,
                ))
            },
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;

    let Some((
        key,
        blob,
        provider_id,
        model_id,
        dimensions,
        compressed,
        tags,
        created_at,
        expires_at,
        last_used_at,
        hit_count,
    )) = row
    else {
        return Ok(None);
    };

    let expires_at = match expires_at {
        Some(s) => Some(parse_rfc3339(&s)?),
        None => None,
    };
    if expires_at.is_some_and(|t| t <= now) {
        return Ok(None);
    }

    conn.execute(
        "UPDATE embedding_cache SET hit_count = hit_count + 1, last_used_at = ?1 WHERE key = ?2",
        params![to_rfc3339(now), key],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let tags: Vec<String> = serde_json::from_str(&tags).unwrap_or_default();

    Ok(Some(CacheRecord {
        key,
        blob,
        compressed,
        provider_id,
        model_id,
        dimensions: dimensions as usize,
        tags,
        created_at: parse_rfc3339(&created_at)?,
        expires_at,
        last_used_at: parse_rfc3339(&last_used_at)?,
        hit_count: hit_count as u64,
    }))
}

pub fn cache_put(conn: &Connection, record: &CacheRecord) -> QuarryResult<()> {
    let tags = serde_json::to_string(&record.tags)
        .map_err(|e| to_storage_err(format!("tags serialize: {e}")))?;
    conn.execute(
        "INSERT OR REPLACE INTO embedding_cache
            (key, embedding, provider, model, dimensions, compressed, tags,
             created_at, expires_at, last_used_at, hit_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            record.key,
            record.blob,
            record.provider_id,
            record.model_id,
            record.dimensions as i64,
            record.compressed,
            tags,
            to_rfc3339(record.created_at),
            record.expires_at.map(to_rfc3339),
            to_rfc3339(record.last_used_at),
            record.hit_count as i64,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Invalidate by exact key, glob (`*`), or `tag:<label>`. Returns rows
/// removed.
pub fn cache_invalidate(conn: &Connection, pattern: &str) -> QuarryResult<usize> {
    let removed = if let Some(label) = pattern.strip_prefix("tag:") {
        // Tags are stored as a JSON array; match the quoted label.
        conn.execute(
            "DELETE FROM embedding_cache WHERE tags LIKE ?1",
            params![format!("%\"{}\"%", label.replace('%', "").replace('_', ""))],
        )
        .map_err(|e| to_storage_err(e.to_string()))?
    } else if pattern.contains('*') {
        let like = glob_to_like(pattern);
        conn.execute(
            "DELETE FROM embedding_cache WHERE key LIKE ?1 ESCAPE '\\'",
            params![like],
        )
        .map_err(|e| to_storage_err(e.to_string()))?
    } else {
        conn.execute(
            "DELETE FROM embedding_cache WHERE key = ?1",
            params![pattern],
        )
        .map_err(|e| to_storage_err(e.to_string()))?
    };
    Ok(removed)
}

pub fn cache_trim_expired(conn: &Connection, now: DateTime<Utc>) -> QuarryResult<usize> {
    let removed = conn
        .execute(
            "DELETE FROM embedding_cache WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![to_rfc3339(now)],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(removed)
}

/// Translate a `*` glob into a LIKE pattern, escaping LIKE's own
/// wildcards.
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
