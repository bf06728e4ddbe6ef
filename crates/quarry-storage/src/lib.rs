//! # quarry-storage
//!
//! The SQL collaborator: a SQLite engine with a single write connection,
//! a round-robin read pool, versioned migrations, per-collection document
//! + FTS5 + vector tables, the tier-3 embedding cache table, and the
//! persistent embedding queue. Implements `quarry_core::DocumentStorage`;
//! nothing above this crate speaks SQL.

pub mod codec;
pub mod engine;
pub mod migrations;
pub mod pool;
pub mod queries;

pub use engine::StorageEngine;
