//! In-memory fakes for the provider and storage ports.

use crate::domain::{ClosingArtifact, ConversationTranscript, MemoryRecord, OpeningArtifact};
use crate::ports::{
    ArtifactStore, EmbeddingProvider, LanguageModel, VectorIndex, VectorIndexProvider,
    VectorMatch, VectorQuery, VectorRecord,
};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

const EMBED_DIM: usize = 32;

/// Deterministic bag-of-words embedder. Identical texts embed identically;
/// `with_mapping` pins chosen texts to explicit vectors so similarity between
/// specific pairs can be controlled exactly.
#[derive(Default)]
pub struct StaticEmbedder {
    mappings: HashMap<String, Vec<f32>>,
}

impl StaticEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.mappings.insert(text.to_string(), vector);
        self
    }

    fn hash_embed(text: &str) -> Vec<f32> {
        let mut values = vec![0.0f32; EMBED_DIM];
        for word in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            values[(hasher.finish() as usize) % EMBED_DIM] += 1.0;
        }
        values
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        self.mappings
            .get(text)
            .cloned()
            .unwrap_or_else(|| Self::hash_embed(text))
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na * nb)) as f64
    }
}

/// A cosine-similarity vector index held in memory, namespaced like the real
/// one.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    namespaces: Mutex<HashMap<String, Vec<VectorRecord>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, namespace: &str) -> usize {
        self.namespaces
            .lock()
            .unwrap()
            .get(namespace)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    pub fn get_record(&self, namespace: &str, id: &str) -> Option<VectorRecord> {
        self.namespaces
            .lock()
            .unwrap()
            .get(namespace)
            .and_then(|records| records.iter().find(|r| r.id == id).cloned())
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn query(&self, query: VectorQuery) -> anyhow::Result<Vec<VectorMatch>> {
        let namespaces = self.namespaces.lock().unwrap();
        let records = match namespaces.get(&query.namespace) {
            Some(records) => records,
            None => return Ok(Vec::new()),
        };

        let mut matches: Vec<VectorMatch> = records
            .iter()
            .filter(|r| {
                r.metadata.get("learner_id").and_then(|v| v.as_str())
                    == Some(query.learner_id.as_str())
            })
            .filter(|r| match &query.exclude_session_id {
                Some(excluded) => {
                    r.metadata.get("session_id").and_then(|v| v.as_str()) != Some(excluded.as_str())
                }
                None => true,
            })
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: cosine(&r.values, &query.vector),
                metadata: r.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(query.top_k);
        Ok(matches)
    }

    async fn upsert(&self, namespace: &str, record: VectorRecord) -> anyhow::Result<()> {
        let mut namespaces = self.namespaces.lock().unwrap();
        let records = namespaces.entry(namespace.to_string()).or_default();
        if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
            *existing = record;
        } else {
            records.push(record);
        }
        Ok(())
    }

    async fn update_metadata(
        &self,
        namespace: &str,
        id: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> anyhow::Result<()> {
        let mut namespaces = self.namespaces.lock().unwrap();
        let records = namespaces
            .get_mut(namespace)
            .ok_or_else(|| anyhow::anyhow!("unknown namespace {namespace}"))?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("unknown vector id {id}"))?;
        record.metadata = metadata;
        Ok(())
    }
}

/// Provider handing out shared in-memory indexes by name.
#[derive(Default)]
pub struct InMemoryVectorProvider {
    indexes: Mutex<HashMap<String, Arc<InMemoryVectorIndex>>>,
}

impl InMemoryVectorProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self, name: &str) -> Option<Arc<InMemoryVectorIndex>> {
        self.indexes.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl VectorIndexProvider for InMemoryVectorProvider {
    async fn open_index(&self, index_name: &str) -> anyhow::Result<Arc<dyn VectorIndex>> {
        let mut indexes = self.indexes.lock().unwrap();
        let index = indexes
            .entry(index_name.to_string())
            .or_insert_with(|| Arc::new(InMemoryVectorIndex::new()));
        Ok(Arc::clone(index) as Arc<dyn VectorIndex>)
    }
}

/// Scripted language model: queued responses pop in order; an empty queue
/// yields an error (upstream failure). Prompts are recorded for assertions.
#[derive(Default)]
pub struct ScriptedLanguageModel {
    responses: Mutex<VecDeque<anyhow::Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(response.to_string()));
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!(message.to_string())));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted response left")))
    }
}

/// Artifact store backed by maps; mirrors the JSON file layout semantics.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    openings: Mutex<HashMap<String, OpeningArtifact>>,
    closings: Mutex<HashMap<String, ClosingArtifact>>,
    conversations: Mutex<HashMap<String, ConversationTranscript>>,
    backups: Mutex<HashMap<(String, String), Vec<MemoryRecord>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(&self, session_id: &str) -> Option<ConversationTranscript> {
        self.conversations.lock().unwrap().get(session_id).cloned()
    }

    pub fn backups_for(&self, learner_id: &str, category: &str) -> Vec<MemoryRecord> {
        self.backups
            .lock()
            .unwrap()
            .get(&(learner_id.to_string(), category.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_opening(&self, learner_id: &str, artifact: OpeningArtifact) {
        self.openings
            .lock()
            .unwrap()
            .insert(learner_id.to_string(), artifact);
    }

    pub fn closing_for(&self, learner_id: &str) -> Option<ClosingArtifact> {
        self.closings.lock().unwrap().get(learner_id).cloned()
    }

    pub fn has_opening(&self, learner_id: &str) -> bool {
        self.openings.lock().unwrap().contains_key(learner_id)
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save_opening(
        &self,
        learner_id: &str,
        artifact: &OpeningArtifact,
    ) -> anyhow::Result<()> {
        self.openings
            .lock()
            .unwrap()
            .insert(learner_id.to_string(), artifact.clone());
        Ok(())
    }

    async fn load_opening(&self, learner_id: &str) -> anyhow::Result<Option<OpeningArtifact>> {
        Ok(self.openings.lock().unwrap().get(learner_id).cloned())
    }

    async fn clear_opening(&self, learner_id: &str) -> anyhow::Result<()> {
        self.openings.lock().unwrap().remove(learner_id);
        Ok(())
    }

    async fn save_closing(
        &self,
        learner_id: &str,
        artifact: &ClosingArtifact,
    ) -> anyhow::Result<()> {
        self.closings
            .lock()
            .unwrap()
            .insert(learner_id.to_string(), artifact.clone());
        Ok(())
    }

    async fn load_closing(
        &self,
        learner_id: &str,
        session_id: &str,
    ) -> anyhow::Result<Option<ClosingArtifact>> {
        Ok(self
            .closings
            .lock()
            .unwrap()
            .get(learner_id)
            .filter(|c| c.session_id == session_id)
            .cloned())
    }

    async fn append_memory_backup(
        &self,
        learner_id: &str,
        memory: &MemoryRecord,
    ) -> anyhow::Result<()> {
        let mut backups = self.backups.lock().unwrap();
        let list = backups
            .entry((learner_id.to_string(), memory.category.as_str().to_string()))
            .or_default();
        if let Some(existing) = list.iter_mut().find(|m| m.id == memory.id) {
            *existing = memory.clone();
        } else {
            list.push(memory.clone());
        }
        Ok(())
    }

    async fn save_conversation(
        &self,
        _learner_id: &str,
        transcript: &ConversationTranscript,
    ) -> anyhow::Result<()> {
        self.conversations
            .lock()
            .unwrap()
            .insert(transcript.session_id.clone(), transcript.clone());
        Ok(())
    }
}
