/// Embedding-queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue item {id} not found")]
    ItemNotFound { id: i64 },

    #[error("invalid transition {from} -> {to} for item {id}")]
    InvalidTransition {
        id: i64,
        from: &'static str,
        to: &'static str,
    },

    #[error("refusing to clear items in `processing`; pass force to override")]
    ClearRefused,
}
