use crate::domain::{ClosingArtifact, ConversationTranscript, MemoryRecord, OpeningArtifact};
use async_trait::async_trait;

/// Durable per-learner JSON artifacts: opening/closing session documents,
/// memory backups per category, and conversation transcripts.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save_opening(
        &self,
        learner_id: &str,
        artifact: &OpeningArtifact,
    ) -> anyhow::Result<()>;

    async fn load_opening(&self, learner_id: &str) -> anyhow::Result<Option<OpeningArtifact>>;

    /// Remove the opening artifact so the next session starts fresh.
    async fn clear_opening(&self, learner_id: &str) -> anyhow::Result<()>;

    async fn save_closing(
        &self,
        learner_id: &str,
        artifact: &ClosingArtifact,
    ) -> anyhow::Result<()>;

    /// Load the closing artifact if it belongs to the given session.
    async fn load_closing(
        &self,
        learner_id: &str,
        session_id: &str,
    ) -> anyhow::Result<Option<ClosingArtifact>>;

    /// Mirror a memory record into the per-category backup file
    /// (insert-or-replace by memory id).
    async fn append_memory_backup(
        &self,
        learner_id: &str,
        memory: &MemoryRecord,
    ) -> anyhow::Result<()>;

    async fn save_conversation(
        &self,
        learner_id: &str,
        transcript: &ConversationTranscript,
    ) -> anyhow::Result<()>;
}
