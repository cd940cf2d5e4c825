use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A vector with its metadata, as stored in an index namespace.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// A nearest-neighbor match. `score` is cosine similarity.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f64,
    pub metadata: Map<String, Value>,
}

/// A namespace query with the filters the memory store needs: restrict to a
/// learner, optionally exclude vectors written by the current session.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub namespace: String,
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub learner_id: String,
    pub exclude_session_id: Option<String>,
}

/// One vector index (one per learner). Implementations must be safe for
/// concurrent use; the client is created once and shared.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn query(&self, query: VectorQuery) -> anyhow::Result<Vec<VectorMatch>>;

    async fn upsert(&self, namespace: &str, record: VectorRecord) -> anyhow::Result<()>;

    /// Update metadata in place without re-embedding.
    async fn update_metadata(
        &self,
        namespace: &str,
        id: &str,
        metadata: Map<String, Value>,
    ) -> anyhow::Result<()>;
}

/// Opens (creating if necessary) a named index and waits for readiness.
/// A concurrent-create conflict from another process is not an error.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VectorIndexProvider: Send + Sync {
    async fn open_index(&self, index_name: &str) -> anyhow::Result<Arc<dyn VectorIndex>>;
}
