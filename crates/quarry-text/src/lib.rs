//! # quarry-text
//!
//! Deterministic transformation of arbitrary text into the exact string fed
//! to embedding providers and into cache keys. Pure functions, safe from
//! any thread. Truncation is never an error; empty and oversized inputs are.

pub mod fingerprint;
pub mod hashing;
pub mod markup;
pub mod processor;
pub mod truncate;

pub use fingerprint::preprocessing_fingerprint;
pub use hashing::{content_hash, ContentHash};
pub use processor::{process, ProcessedText};
