//! Seams between crates: the provider contract and the narrow storage
//! interface consumed by the pipeline, queue, and retrieval layers.

pub mod embedding;
pub mod storage;

pub use embedding::EmbeddingProvider;
pub use storage::DocumentStorage;
