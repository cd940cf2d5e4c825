//! JSON file store for per-learner artifacts. Layout under the base dir:
//!
//! ```text
//! {learner}/memory/TeachingAssistant/TA-opening-retrieval.json
//! {learner}/memory/TeachingAssistant/TA-closing-retrieval.json
//! {learner}/memory/{category}.json
//! {learner}/conversations/{session_id}.json
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tutor_core::{
    ArtifactStore, ClosingArtifact, ConversationTranscript, MemoryRecord, OpeningArtifact,
};

const TA_DIR: &str = "TeachingAssistant";
const OPENING_FILE: &str = "TA-opening-retrieval.json";
const CLOSING_FILE: &str = "TA-closing-retrieval.json";

pub struct JsonArtifactStore {
    base_dir: PathBuf,
}

impl JsonArtifactStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn memory_dir(&self, learner_id: &str) -> PathBuf {
        self.base_dir.join(learner_id).join("memory")
    }

    fn ta_dir(&self, learner_id: &str) -> PathBuf {
        self.memory_dir(learner_id).join(TA_DIR)
    }

    fn conversations_dir(&self, learner_id: &str) -> PathBuf {
        self.base_dir.join(learner_id).join("conversations")
    }

    async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let rendered = serde_json::to_string_pretty(value)?;
        fs::write(path, rendered).await?;
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
        match fs::read_to_string(path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl ArtifactStore for JsonArtifactStore {
    async fn save_opening(
        &self,
        learner_id: &str,
        artifact: &OpeningArtifact,
    ) -> anyhow::Result<()> {
        let path = self.ta_dir(learner_id).join(OPENING_FILE);
        Self::write_json(&path, artifact).await
    }

    async fn load_opening(&self, learner_id: &str) -> anyhow::Result<Option<OpeningArtifact>> {
        let path = self.ta_dir(learner_id).join(OPENING_FILE);
        Self::read_json(&path).await
    }

    async fn clear_opening(&self, learner_id: &str) -> anyhow::Result<()> {
        let path = self.ta_dir(learner_id).join(OPENING_FILE);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_closing(
        &self,
        learner_id: &str,
        artifact: &ClosingArtifact,
    ) -> anyhow::Result<()> {
        let path = self.ta_dir(learner_id).join(CLOSING_FILE);
        Self::write_json(&path, artifact).await
    }

    async fn load_closing(
        &self,
        learner_id: &str,
        session_id: &str,
    ) -> anyhow::Result<Option<ClosingArtifact>> {
        let path = self.ta_dir(learner_id).join(CLOSING_FILE);
        let artifact: Option<ClosingArtifact> = Self::read_json(&path).await?;
        Ok(artifact.filter(|a| a.session_id == session_id))
    }

    async fn append_memory_backup(
        &self,
        learner_id: &str,
        memory: &MemoryRecord,
    ) -> anyhow::Result<()> {
        let path = self
            .memory_dir(learner_id)
            .join(format!("{}.json", memory.category.as_str()));

        let mut memories: Vec<MemoryRecord> = Self::read_json(&path).await?.unwrap_or_default();
        match memories.iter_mut().find(|m| m.id == memory.id) {
            Some(existing) => *existing = memory.clone(),
            None => memories.push(memory.clone()),
        }
        Self::write_json(&path, &memories).await
    }

    async fn save_conversation(
        &self,
        learner_id: &str,
        transcript: &ConversationTranscript,
    ) -> anyhow::Result<()> {
        let path = self
            .conversations_dir(learner_id)
            .join(format!("{}.json", transcript.session_id));
        Self::write_json(&path, transcript).await?;
        tracing::info!(
            learner_id,
            session_id = %transcript.session_id,
            turns = transcript.turns.len(),
            "conversation transcript saved"
        );
        Ok(())
    }
}
