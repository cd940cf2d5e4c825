use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tutor_core::Session;

#[derive(Debug, FromRow)]
pub struct SessionRow {
    pub id: String,
    pub learner_id: String,
    pub started_at_ms: i64,
    pub ended_at_ms: Option<i64>,
    pub active: bool,
    pub last_activity_ms: i64,
    pub turn_count: i64,
    pub questions_attempted: i64,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            learner_id: row.learner_id,
            started_at: DateTime::from_timestamp_millis(row.started_at_ms)
                .unwrap_or_else(Utc::now),
            ended_at: row.ended_at_ms.and_then(DateTime::from_timestamp_millis),
            active: row.active,
            last_activity_at: DateTime::from_timestamp_millis(row.last_activity_ms)
                .unwrap_or_else(Utc::now),
            turn_count: row.turn_count as i32,
            questions_attempted: row.questions_attempted as i32,
        }
    }
}
