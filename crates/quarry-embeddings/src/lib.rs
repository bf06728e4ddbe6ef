//! # quarry-embeddings
//!
//! Everything between raw text and a cached vector: the three-tier
//! embedding cache, the provider pool (validation, rate limiting, retry,
//! fallback), and the pipeline façade used by query-time and ingest-time
//! work alike.

pub mod cache;
pub mod pipeline;
pub mod pool;
pub mod providers;

pub use cache::{CacheCoordinator, CacheStats, CachedEmbedding};
pub use pipeline::{
    BatchOptions, EmbedFailure, EmbedOutcome, EmbedRequest, EmbedResult, EmbeddingPipeline,
};
pub use pool::ProviderPool;
