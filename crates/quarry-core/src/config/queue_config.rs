use serde::{Deserialize, Serialize};

use super::defaults;

/// Background embedding queue configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Items reserved per worker pass.
    pub batch_size: usize,
    pub max_attempts: u32,
    /// Reservation lease; stale `processing` items return to `pending`
    /// after this long.
    pub visibility_timeout_secs: u64,
    /// Delay between worker passes.
    pub throttle_ms: u64,
    /// Base delay for the exponential retry backoff.
    pub backoff_base_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::DEFAULT_QUEUE_BATCH_SIZE,
            max_attempts: defaults::DEFAULT_QUEUE_MAX_ATTEMPTS,
            visibility_timeout_secs: defaults::DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS,
            throttle_ms: defaults::DEFAULT_QUEUE_THROTTLE_MS,
            backoff_base_ms: defaults::DEFAULT_QUEUE_BACKOFF_BASE_MS,
        }
    }
}
