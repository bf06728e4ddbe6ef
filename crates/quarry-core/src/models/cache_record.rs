use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tier-3 (database) cache row. The vector travels as an encoded blob;
/// the cache coordinator owns the codec, storage stays dumb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub key: String,
    pub blob: Vec<u8>,
    pub compressed: bool,
    pub provider_id: String,
    pub model_id: String,
    pub dimensions: usize,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: DateTime<Utc>,
    pub hit_count: u64,
}

impl CacheRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }

    pub fn byte_size(&self) -> usize {
        self.blob.len()
    }
}
