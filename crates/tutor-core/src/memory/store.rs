//! Per-learner vector memory store: junk filtering, dedup-on-write against
//! the nearest stored neighbor, and 3-factor scored search.

use crate::config::MemoryConfig;
use crate::domain::{BatchStats, MemoryCategory, MemoryRecord, SaveOutcome, ScoredMemory};
use crate::ports::{
    ArtifactStore, EmbeddingProvider, VectorIndex, VectorIndexProvider, VectorMatch, VectorQuery,
    VectorRecord,
};
use anyhow::Result;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lowercase a learner id into a valid index name: non-alphanumerics become
/// hyphens, runs collapse, edges trim, empty falls back to "anonymous".
pub fn sanitize_index_name(learner_id: &str) -> String {
    let mut sanitized = String::with_capacity(learner_id.len());
    for ch in learner_id.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            sanitized.push(ch);
        } else if !sanitized.ends_with('-') {
            sanitized.push('-');
        }
    }
    let trimmed = sanitized.trim_matches('-');
    if trimmed.is_empty() {
        "anonymous".to_string()
    } else {
        trimmed.to_string()
    }
}

fn now_epoch() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Fields owned by the record itself; everything else in stored metadata is
/// treated as free-form extracted data.
const RECORD_FIELDS: [&str; 9] = [
    "learner_id",
    "category",
    "text",
    "importance",
    "session_id",
    "timestamp",
    "counter",
    "first_epoch",
    "last_epoch",
];

fn record_to_metadata(memory: &MemoryRecord) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("learner_id".into(), json!(memory.learner_id));
    metadata.insert("category".into(), json!(memory.category.as_str()));
    metadata.insert("text".into(), json!(memory.text));
    metadata.insert("importance".into(), json!(memory.importance));
    metadata.insert("session_id".into(), json!(memory.session_id));
    metadata.insert("timestamp".into(), json!(memory.created_at.to_rfc3339()));
    metadata.insert("counter".into(), json!(memory.counter));
    metadata.insert("first_epoch".into(), json!(memory.first_epoch));
    metadata.insert("last_epoch".into(), json!(memory.last_epoch));
    for (key, value) in &memory.metadata {
        if !value.is_null() {
            metadata.insert(key.clone(), value.clone());
        }
    }
    metadata
}

fn metadata_to_record(id: &str, metadata: &Map<String, Value>) -> Option<MemoryRecord> {
    let category = MemoryCategory::parse(metadata.get("category")?.as_str()?).ok()?;
    let text = metadata.get("text")?.as_str()?.to_string();
    let created_at = metadata
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let mut extra = Map::new();
    for (key, value) in metadata {
        if !RECORD_FIELDS.contains(&key.as_str()) {
            extra.insert(key.clone(), value.clone());
        }
    }

    Some(MemoryRecord {
        id: id.to_string(),
        category,
        text,
        importance: metadata.get("importance").and_then(|v| v.as_f64()).unwrap_or(0.5),
        learner_id: metadata
            .get("learner_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        session_id: metadata
            .get("session_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        created_at,
        counter: metadata.get("counter").and_then(|v| v.as_u64()).unwrap_or(1) as u32,
        first_epoch: metadata.get("first_epoch").and_then(|v| v.as_f64()).unwrap_or(0.0),
        last_epoch: metadata.get("last_epoch").and_then(|v| v.as_f64()).unwrap_or(0.0),
        metadata: extra,
    })
}

/// One learner's memory store, bound to their sanitized index.
pub struct MemoryStore {
    learner_id: String,
    index_name: String,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    artifacts: Arc<dyn ArtifactStore>,
    config: MemoryConfig,
}

impl MemoryStore {
    pub async fn open(
        learner_id: &str,
        provider: &dyn VectorIndexProvider,
        embedder: Arc<dyn EmbeddingProvider>,
        artifacts: Arc<dyn ArtifactStore>,
        config: MemoryConfig,
    ) -> Result<Self> {
        let index_name = format!("memory-{}", sanitize_index_name(learner_id));
        tracing::info!(learner_id, index_name, "opening learner memory index");
        let index = provider.open_index(&index_name).await?;
        Ok(Self {
            learner_id: learner_id.to_string(),
            index_name,
            index,
            embedder,
            artifacts,
            config,
        })
    }

    pub fn learner_id(&self) -> &str {
        &self.learner_id
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Too short, or a bare junk word: not worth a vector.
    fn is_junk(&self, text: &str) -> bool {
        let words: Vec<&str> = text.trim().split_whitespace().collect();
        if words.len() < self.config.min_word_count {
            return true;
        }
        words.len() == 1 && self.config.junk_words.contains(&words[0].to_lowercase())
    }

    async fn nearest_neighbor(
        &self,
        memory: &MemoryRecord,
        embedding: &[f32],
    ) -> Result<Option<VectorMatch>> {
        let matches = self
            .index
            .query(VectorQuery {
                namespace: memory.category.as_str().to_string(),
                vector: embedding.to_vec(),
                top_k: 1,
                learner_id: self.learner_id.clone(),
                exclude_session_id: None,
            })
            .await?;
        Ok(matches.into_iter().next())
    }

    /// Save with dedup. A nearest neighbor at or above the similarity
    /// threshold is updated in place (counter += 1, latest phrasing, max
    /// importance, first_epoch preserved) without re-embedding; anything
    /// else inserts a new vector.
    pub async fn save(&self, mut memory: MemoryRecord) -> Result<SaveOutcome> {
        if self.is_junk(&memory.text) {
            tracing::debug!(text = %memory.text, "filtered junk memory");
            return Ok(SaveOutcome::Filtered);
        }

        let embedding = self.embedder.embed(&memory.text).await?;
        let duplicate = match self.nearest_neighbor(&memory, &embedding).await {
            Ok(hit) => hit.filter(|m| m.score >= self.config.similarity_threshold),
            Err(err) => {
                // A failed dedup probe must not lose the memory.
                tracing::error!(error = %err, "duplicate check failed, inserting as new");
                None
            }
        };

        let outcome = match duplicate {
            Some(existing) => {
                let old = metadata_to_record(&existing.id, &existing.metadata);
                let (old_counter, old_importance, first_epoch) = old
                    .map(|m| (m.counter, m.importance, m.first_epoch))
                    .unwrap_or((1, 0.5, memory.first_epoch));

                memory.counter = old_counter + 1;
                memory.importance = memory.importance.max(old_importance);
                memory.first_epoch = first_epoch;
                memory.last_epoch = now_epoch();
                memory.id = existing.id.clone();

                self.index
                    .update_metadata(
                        memory.category.as_str(),
                        &existing.id,
                        record_to_metadata(&memory),
                    )
                    .await?;

                tracing::info!(
                    id = %existing.id,
                    similarity = existing.score,
                    counter = memory.counter,
                    importance = memory.importance,
                    "reinforced existing memory"
                );
                SaveOutcome::Updated {
                    existing_id: existing.id,
                    counter: memory.counter,
                }
            }
            None => {
                self.index
                    .upsert(
                        memory.category.as_str(),
                        VectorRecord {
                            id: memory.id.clone(),
                            values: embedding,
                            metadata: record_to_metadata(&memory),
                        },
                    )
                    .await?;
                tracing::info!(
                    id = %memory.id,
                    category = %memory.category,
                    importance = memory.importance,
                    "created new memory"
                );
                SaveOutcome::Created
            }
        };

        if let Err(err) = self.artifacts.append_memory_backup(&self.learner_id, &memory).await {
            tracing::warn!(error = %err, "memory backup write failed");
        }
        Ok(outcome)
    }

    /// Run each memory through the dedup policy; per-item failures are
    /// counted and do not stop the batch.
    pub async fn save_batch(&self, memories: Vec<MemoryRecord>) -> BatchStats {
        let mut stats = BatchStats::default();
        if memories.is_empty() {
            tracing::warn!("save_batch called with no memories");
            return stats;
        }

        let total = memories.len();
        for (i, memory) in memories.into_iter().enumerate() {
            match self.save(memory).await {
                Ok(SaveOutcome::Created) => {
                    stats.processed += 1;
                    stats.new_created += 1;
                }
                Ok(SaveOutcome::Updated { .. }) => {
                    stats.processed += 1;
                    stats.duplicates_updated += 1;
                }
                Ok(SaveOutcome::Filtered) => {
                    stats.filtered += 1;
                }
                Err(err) => {
                    tracing::error!(item = i + 1, total, error = %err, "batch save item failed");
                    stats.errors += 1;
                }
            }
        }

        tracing::info!(
            processed = stats.processed,
            created = stats.new_created,
            updated = stats.duplicates_updated,
            filtered = stats.filtered,
            errors = stats.errors,
            "memory batch complete"
        );
        stats
    }

    /// Recency combines time decay and reinforcement frequency half-and-half.
    fn recency_score(&self, counter: u32, last_epoch: f64) -> f64 {
        let hours_since_last = ((now_epoch() - last_epoch) / 3600.0).max(0.0);
        let time_factor = 1.0 / (1.0 + hours_since_last / self.config.recency_decay_hours);
        let frequency_factor =
            (counter as f64 / self.config.max_counter_for_frequency as f64).min(1.0);
        time_factor * 0.5 + frequency_factor * 0.5
    }

    fn score(&self, memory: &MemoryRecord, similarity: f64) -> ScoredMemory {
        let recency = self.recency_score(memory.counter, memory.last_epoch);
        let importance = memory.importance;
        let final_score = similarity * self.config.weight_similarity
            + recency * self.config.weight_recency
            + importance * self.config.weight_importance;
        ScoredMemory {
            memory: memory.clone(),
            similarity,
            recency,
            importance,
            final_score,
        }
    }

    /// Search one category or all of them, excluding memories created by the
    /// given session, returning the top-k by combined score. A failing
    /// category is skipped; the others still return.
    pub async fn search(
        &self,
        query: &str,
        category: Option<MemoryCategory>,
        top_k: usize,
        exclude_session_id: Option<&str>,
    ) -> Result<Vec<ScoredMemory>> {
        let embedding = self.embedder.embed_query(query).await?;
        let categories: Vec<MemoryCategory> = match category {
            Some(cat) => vec![cat],
            None => MemoryCategory::ALL.to_vec(),
        };

        let mut scored = Vec::new();
        for cat in categories {
            let result = self
                .index
                .query(VectorQuery {
                    namespace: cat.as_str().to_string(),
                    vector: embedding.clone(),
                    top_k,
                    learner_id: self.learner_id.clone(),
                    exclude_session_id: exclude_session_id.map(|s| s.to_string()),
                })
                .await;
            match result {
                Ok(matches) => {
                    for hit in matches {
                        match metadata_to_record(&hit.id, &hit.metadata) {
                            Some(memory) => scored.push(self.score(&memory, hit.score)),
                            None => {
                                tracing::warn!(id = %hit.id, namespace = %cat, "match has unusable metadata, skipping")
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::error!(namespace = %cat, error = %err, "category search failed, continuing");
                }
            }
        }

        scored.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);

        tracing::info!(
            index = %self.index_name,
            results = scored.len(),
            top_k,
            "memory search complete"
        );
        Ok(scored)
    }
}

/// Lazily opened, cached per-learner stores sharing one provider/embedder.
pub struct MemoryStoreRegistry {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
    provider: Arc<dyn VectorIndexProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    artifacts: Arc<dyn ArtifactStore>,
    config: MemoryConfig,
}

impl MemoryStoreRegistry {
    pub fn new(
        provider: Arc<dyn VectorIndexProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        artifacts: Arc<dyn ArtifactStore>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
            provider,
            embedder,
            artifacts,
            config,
        }
    }

    pub async fn get_or_open(&self, learner_id: &str) -> Result<Arc<MemoryStore>> {
        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(learner_id) {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(
            MemoryStore::open(
                learner_id,
                self.provider.as_ref(),
                Arc::clone(&self.embedder),
                Arc::clone(&self.artifacts),
                self.config.clone(),
            )
            .await?,
        );
        stores.insert(learner_id.to_string(), Arc::clone(&store));
        Ok(store)
    }
}
