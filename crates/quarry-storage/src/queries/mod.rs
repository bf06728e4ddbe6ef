//! SQL query modules, one per concern. Free functions over `&Connection`;
//! transaction boundaries belong to the engine.

pub mod cache;
pub mod collections;
pub mod documents;
pub mod fts;
pub mod queue;
pub mod vector;

/// Per-collection table names. Collection names are validated to
/// `[A-Za-z0-9_-]` before they ever reach these helpers, which is what
/// makes the interpolation safe.
pub fn docs_table(collection: &str) -> String {
    format!("docs_{collection}")
}

pub fn fts_table(collection: &str) -> String {
    format!("fts_{collection}")
}

pub fn vec_table(collection: &str, dimensions: usize) -> String {
    format!("vec_{collection}_{dimensions}")
}
