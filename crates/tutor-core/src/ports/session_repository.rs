use crate::domain::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, session: &Session) -> anyhow::Result<()>;

    async fn get_session(&self, session_id: &str) -> anyhow::Result<Option<Session>>;

    /// The active session for a learner, if any.
    async fn get_active_session(&self, learner_id: &str) -> anyhow::Result<Option<Session>>;

    async fn list_active_sessions(&self) -> anyhow::Result<Vec<Session>>;

    /// Mark a session ended. Idempotent.
    async fn end_session(&self, session_id: &str, ended_at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Refresh the last-activity timestamp.
    async fn touch_session(&self, session_id: &str, at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Increment the conversation turn counter.
    async fn record_turn(&self, session_id: &str) -> anyhow::Result<()>;

    /// Increment the questions-attempted counter.
    async fn record_question(&self, session_id: &str) -> anyhow::Result<()>;
}
