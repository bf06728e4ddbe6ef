use crate::errors::QuarryResult;
use crate::models::{ProviderHealth, ProviderMetricsSnapshot};

/// Embedding generation provider.
///
/// Calls are blocking; the pipeline runs them on blocking threads and
/// races them against deadlines. Implementations are shared across
/// callers, so all state is interior.
pub trait EmbeddingProvider: Send + Sync {
    /// Stable provider id ("local-hash", "remote-http", ...).
    fn name(&self) -> &str;

    fn model_id(&self) -> &str;

    /// Fixed output dimensionality for this instance.
    fn dimensions(&self) -> usize;

    /// Largest batch a single `embed_batch` call accepts.
    fn max_batch_size(&self) -> usize;

    /// Longest input text (characters) a single call accepts.
    fn max_text_length(&self) -> usize;

    /// Warm the instance (load artifacts, open connections). Called once
    /// by the pool before first use.
    fn initialize(&self) -> QuarryResult<()> {
        Ok(())
    }

    /// Release resources. Draining in-flight calls is the pool's job.
    fn cleanup(&self) -> QuarryResult<()> {
        Ok(())
    }

    /// Embed a single text, returning a vector of `dimensions()` floats.
    fn embed(&self, text: &str) -> QuarryResult<Vec<f32>>;

    /// Embed a batch; output order matches input order.
    fn embed_batch(&self, texts: &[String]) -> QuarryResult<Vec<Vec<f32>>>;

    fn health_check(&self) -> ProviderHealth;

    fn metrics(&self) -> ProviderMetricsSnapshot;
}
