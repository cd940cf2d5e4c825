use super::models::SessionRow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, SqlitePool};
use tutor_core::{Session, SessionRepository};

pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str = "id, learner_id, started_at_ms, ended_at_ms, active, \
                               last_activity_ms, turn_count, questions_attempted";

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create_session(&self, session: &Session) -> anyhow::Result<()> {
        query(
            "INSERT INTO sessions
             (id, learner_id, started_at_ms, ended_at_ms, active, last_activity_ms,
              turn_count, questions_attempted)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.learner_id)
        .bind(session.started_at.timestamp_millis())
        .bind(session.ended_at.map(|t| t.timestamp_millis()))
        .bind(session.active)
        .bind(session.last_activity_at.timestamp_millis())
        .bind(session.turn_count as i64)
        .bind(session.questions_attempted as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> anyhow::Result<Option<Session>> {
        let row = query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn get_active_session(&self, learner_id: &str) -> anyhow::Result<Option<Session>> {
        let row = query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE learner_id = ? AND active = 1
             ORDER BY started_at_ms DESC
             LIMIT 1"
        ))
        .bind(learner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn list_active_sessions(&self) -> anyhow::Result<Vec<Session>> {
        let rows = query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE active = 1 ORDER BY started_at_ms"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }

    async fn end_session(&self, session_id: &str, ended_at: DateTime<Utc>) -> anyhow::Result<()> {
        query("UPDATE sessions SET active = 0, ended_at_ms = ? WHERE id = ? AND active = 1")
            .bind(ended_at.timestamp_millis())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_session(&self, session_id: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        query("UPDATE sessions SET last_activity_ms = ? WHERE id = ?")
            .bind(at.timestamp_millis())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_turn(&self, session_id: &str) -> anyhow::Result<()> {
        query("UPDATE sessions SET turn_count = turn_count + 1 WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_question(&self, session_id: &str) -> anyhow::Result<()> {
        query("UPDATE sessions SET questions_attempted = questions_attempted + 1 WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
