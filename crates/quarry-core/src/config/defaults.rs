// Single source of truth for all default values.

// --- Control plane ---
pub const DEFAULT_MAX_CONCURRENT_OPERATIONS: usize = 64;
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PERFORMANCE_MONITORING: bool = true;
pub const DEFAULT_LOG_LEVEL: &str = "info";

// --- Embedding pipeline ---
pub const DEFAULT_EMBED_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

// --- Providers ---
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 300;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RETRY_BASE_MS: u64 = 1_000;

// --- Cache tiers ---
pub const DEFAULT_MEMORY_TTL_SECS: u64 = 300; // 5 minutes
pub const DEFAULT_MEMORY_MAX_ENTRIES: u64 = 10_000;
pub const DEFAULT_MEMORY_MAX_BYTES: u64 = 64 * 1024 * 1024;
pub const DEFAULT_PERSISTENT_TTL_SECS: u64 = 86_400; // 24 hours
pub const DEFAULT_PERSISTENT_MAX_ENTRIES: u64 = 100_000;
pub const DEFAULT_PERSISTENT_MAX_BYTES: u64 = 512 * 1024 * 1024;
pub const DEFAULT_DATABASE_TTL_SECS: u64 = 604_800; // 7 days
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 600;
/// A tier that crosses its cap evicts down to this fraction of it.
pub const EVICTION_TARGET_RATIO: f64 = 0.8;

// --- Queue ---
pub const DEFAULT_QUEUE_BATCH_SIZE: usize = 50;
pub const DEFAULT_QUEUE_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_QUEUE_THROTTLE_MS: u64 = 100;
pub const DEFAULT_QUEUE_BACKOFF_BASE_MS: u64 = 2_000;

// --- Retrieval ---
pub const DEFAULT_RRF_K: u32 = 60;
pub const DEFAULT_OVERSCAN: usize = 3;
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const DEFAULT_SNIPPET_MAX_CHARS: usize = 200;
pub const DEFAULT_RERANK_TOP_K: usize = 20;
pub const DEFAULT_DIVERSITY_LAMBDA: f64 = 0.7;
pub const DEFAULT_PERFORMANCE_BUDGET_MS: u64 = 500;
