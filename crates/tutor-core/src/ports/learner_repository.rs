use crate::domain::{QuestionAttempt, SkillState};
use async_trait::async_trait;
use std::collections::HashSet;

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LearnerStateRepository: Send + Sync {
    /// Get the state for one learner x skill pair.
    async fn get_skill_state(
        &self,
        learner_id: &str,
        skill_id: &str,
    ) -> anyhow::Result<Option<SkillState>>;

    /// Get every stored state for a learner.
    async fn get_all_states(&self, learner_id: &str) -> anyhow::Result<Vec<SkillState>>;

    /// Save or update a single skill state.
    async fn save_skill_state(&self, state: &SkillState) -> anyhow::Result<()>;

    /// Atomically persist one attempt: the attempt record, the directly
    /// practiced skill states, and any penalized prerequisite states. All
    /// writes commit together or roll back together.
    async fn save_attempt_atomic(
        &self,
        attempt: &QuestionAttempt,
        primary_states: Vec<SkillState>,
        prerequisite_states: Vec<SkillState>,
    ) -> anyhow::Result<()>;

    /// The most recent `limit` attempts for a learner, oldest first.
    async fn recent_attempts(
        &self,
        learner_id: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<QuestionAttempt>>;

    /// All question ids the learner has ever attempted.
    async fn attempted_question_ids(&self, learner_id: &str) -> anyhow::Result<HashSet<String>>;

    /// Total attempt count for a learner.
    async fn attempt_count(&self, learner_id: &str) -> anyhow::Result<u64>;

    /// Whether an assessment has already been completed for this subject.
    async fn has_assessment(&self, learner_id: &str, subject: &str) -> anyhow::Result<bool>;

    /// Record the question set handed out for an assessment.
    async fn record_assessment(
        &self,
        learner_id: &str,
        subject: &str,
        question_ids: &[String],
    ) -> anyhow::Result<()>;
}
