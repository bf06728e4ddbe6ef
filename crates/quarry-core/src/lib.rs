//! # quarry-core
//!
//! Foundation crate for the quarry hybrid search engine.
//! Defines all shared types, traits, errors, config, and constants.
//! Every other crate in the workspace depends on this.

pub mod cancel;
pub mod config;
pub mod constants;
pub mod errors;
pub mod models;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use cancel::CancelFlag;
pub use config::QuarryConfig;
pub use errors::{QuarryError, QuarryResult};
pub use models::{
    Collection, Document, EmbeddingRecord, ExecutionPlan, QueryAnalysis, QueueItem, SearchResult,
};
pub use traits::{DocumentStorage, EmbeddingProvider};
