use async_trait::async_trait;

/// Embedding boundary. Document and query embeddings are separate calls
/// because some providers use asymmetric task types.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a memory text for storage.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}
