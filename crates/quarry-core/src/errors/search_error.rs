/// Search-executor errors. Single-side failures degrade with a warning;
/// this error is raised only when no side can produce results.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("both retrieval sides failed: keyword: {keyword}; vector: {vector}")]
    BothSidesFailed { keyword: String, vector: String },

    #[error("planner produced no executable strategy for {collection}")]
    NoStrategy { collection: String },
}
