use super::models::{AttemptRow, SkillStateRow};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query, query_as, query_scalar, Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;
use tutor_core::{LearnerStateRepository, QuestionAttempt, SkillState};

pub struct SqliteLearnerRepository {
    pool: SqlitePool,
}

impl SqliteLearnerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn save_state_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        state: &SkillState,
    ) -> anyhow::Result<()> {
        query(
            "INSERT INTO learner_skill_states
             (learner_id, skill_id, memory_strength, last_practice_ms, practice_count, correct_count)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(learner_id, skill_id) DO UPDATE SET
                memory_strength = excluded.memory_strength,
                last_practice_ms = excluded.last_practice_ms,
                practice_count = excluded.practice_count,
                correct_count = excluded.correct_count",
        )
        .bind(&state.learner_id)
        .bind(&state.skill_id)
        .bind(state.memory_strength)
        .bind(state.last_practice_time.map(|t| t.timestamp_millis()))
        .bind(state.practice_count as i64)
        .bind(state.correct_count as i64)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LearnerStateRepository for SqliteLearnerRepository {
    async fn get_skill_state(
        &self,
        learner_id: &str,
        skill_id: &str,
    ) -> anyhow::Result<Option<SkillState>> {
        let row = query_as::<_, SkillStateRow>(
            "SELECT learner_id, skill_id, memory_strength, last_practice_ms,
                    practice_count, correct_count
             FROM learner_skill_states
             WHERE learner_id = ? AND skill_id = ?",
        )
        .bind(learner_id)
        .bind(skill_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SkillState::from))
    }

    async fn get_all_states(&self, learner_id: &str) -> anyhow::Result<Vec<SkillState>> {
        let rows = query_as::<_, SkillStateRow>(
            "SELECT learner_id, skill_id, memory_strength, last_practice_ms,
                    practice_count, correct_count
             FROM learner_skill_states
             WHERE learner_id = ?
             ORDER BY skill_id",
        )
        .bind(learner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SkillState::from).collect())
    }

    async fn save_skill_state(&self, state: &SkillState) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::save_state_in_tx(&mut tx, state).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_attempt_atomic(
        &self,
        attempt: &QuestionAttempt,
        primary_states: Vec<SkillState>,
        prerequisite_states: Vec<SkillState>,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        for state in primary_states.iter().chain(prerequisite_states.iter()) {
            Self::save_state_in_tx(&mut tx, state).await?;
        }

        query(
            "INSERT INTO question_attempts
             (learner_id, question_id, skill_ids, is_correct, response_time_seconds, attempted_at_ms)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&attempt.learner_id)
        .bind(&attempt.question_id)
        .bind(serde_json::to_string(&attempt.skill_ids)?)
        .bind(attempt.is_correct)
        .bind(attempt.response_time_seconds)
        .bind(attempt.attempted_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn recent_attempts(
        &self,
        learner_id: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<QuestionAttempt>> {
        let rows = query_as::<_, AttemptRow>(
            "SELECT learner_id, question_id, skill_ids, is_correct,
                    response_time_seconds, attempted_at_ms
             FROM question_attempts
             WHERE learner_id = ?
             ORDER BY attempted_at_ms DESC, id DESC
             LIMIT ?",
        )
        .bind(learner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        // Newest-first from the query; callers expect oldest-first.
        Ok(rows.into_iter().rev().map(QuestionAttempt::from).collect())
    }

    async fn attempted_question_ids(&self, learner_id: &str) -> anyhow::Result<HashSet<String>> {
        let ids = query_scalar::<_, String>(
            "SELECT DISTINCT question_id FROM question_attempts WHERE learner_id = ?",
        )
        .bind(learner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }

    async fn attempt_count(&self, learner_id: &str) -> anyhow::Result<u64> {
        let count = query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM question_attempts WHERE learner_id = ?",
        )
        .bind(learner_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn has_assessment(&self, learner_id: &str, subject: &str) -> anyhow::Result<bool> {
        let row = query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM assessments WHERE learner_id = ? AND subject = ?",
        )
        .bind(learner_id)
        .bind(subject)
        .fetch_one(&self.pool)
        .await?;
        Ok(row > 0)
    }

    async fn record_assessment(
        &self,
        learner_id: &str,
        subject: &str,
        question_ids: &[String],
    ) -> anyhow::Result<()> {
        query(
            "INSERT INTO assessments (learner_id, subject, question_ids, created_at_ms)
             VALUES (?, ?, ?, ?)",
        )
        .bind(learner_id)
        .bind(subject)
        .bind(serde_json::to_string(question_ids)?)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
