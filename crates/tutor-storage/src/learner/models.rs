use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tutor_core::{QuestionAttempt, SkillState};

#[derive(Debug, FromRow)]
pub struct SkillStateRow {
    pub learner_id: String,
    pub skill_id: String,
    pub memory_strength: f64,
    pub last_practice_ms: Option<i64>,
    pub practice_count: i64,
    pub correct_count: i64,
}

impl From<SkillStateRow> for SkillState {
    fn from(row: SkillStateRow) -> Self {
        SkillState {
            learner_id: row.learner_id,
            skill_id: row.skill_id,
            memory_strength: row.memory_strength,
            last_practice_time: row.last_practice_ms.and_then(DateTime::from_timestamp_millis),
            practice_count: row.practice_count as u32,
            correct_count: row.correct_count as u32,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct AttemptRow {
    pub learner_id: String,
    pub question_id: String,
    pub skill_ids: String,
    pub is_correct: bool,
    pub response_time_seconds: f64,
    pub attempted_at_ms: i64,
}

impl From<AttemptRow> for QuestionAttempt {
    fn from(row: AttemptRow) -> Self {
        QuestionAttempt {
            learner_id: row.learner_id,
            question_id: row.question_id,
            skill_ids: serde_json::from_str(&row.skill_ids).unwrap_or_default(),
            is_correct: row.is_correct,
            response_time_seconds: row.response_time_seconds,
            attempted_at: DateTime::from_timestamp_millis(row.attempted_at_ms)
                .unwrap_or_else(Utc::now),
        }
    }
}
