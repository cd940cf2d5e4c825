use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Grade levels K through 12, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeLevel {
    K,
    Grade1,
    Grade2,
    Grade3,
    Grade4,
    Grade5,
    Grade6,
    Grade7,
    Grade8,
    Grade9,
    Grade10,
    Grade11,
    Grade12,
}

impl GradeLevel {
    pub fn value(&self) -> i32 {
        match self {
            GradeLevel::K => 0,
            GradeLevel::Grade1 => 1,
            GradeLevel::Grade2 => 2,
            GradeLevel::Grade3 => 3,
            GradeLevel::Grade4 => 4,
            GradeLevel::Grade5 => 5,
            GradeLevel::Grade6 => 6,
            GradeLevel::Grade7 => 7,
            GradeLevel::Grade8 => 8,
            GradeLevel::Grade9 => 9,
            GradeLevel::Grade10 => 10,
            GradeLevel::Grade11 => 11,
            GradeLevel::Grade12 => 12,
        }
    }

    pub fn from_value(value: i32) -> Option<Self> {
        Some(match value {
            0 => GradeLevel::K,
            1 => GradeLevel::Grade1,
            2 => GradeLevel::Grade2,
            3 => GradeLevel::Grade3,
            4 => GradeLevel::Grade4,
            5 => GradeLevel::Grade5,
            6 => GradeLevel::Grade6,
            7 => GradeLevel::Grade7,
            8 => GradeLevel::Grade8,
            9 => GradeLevel::Grade9,
            10 => GradeLevel::Grade10,
            11 => GradeLevel::Grade11,
            12 => GradeLevel::Grade12,
            _ => return None,
        })
    }

    /// Offset a grade by `delta`, clamping into the Grade1..=Grade12 range used
    /// for assessment buckets.
    pub fn offset_clamped(&self, delta: i32) -> GradeLevel {
        let clamped = (self.value() + delta).clamp(1, 12);
        GradeLevel::from_value(clamped).unwrap_or(GradeLevel::Grade1)
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s {
            "K" | "k" | "kindergarten" => Ok(GradeLevel::K),
            "grade_1" | "GRADE_1" => Ok(GradeLevel::Grade1),
            "grade_2" | "GRADE_2" => Ok(GradeLevel::Grade2),
            "grade_3" | "GRADE_3" => Ok(GradeLevel::Grade3),
            "grade_4" | "GRADE_4" => Ok(GradeLevel::Grade4),
            "grade_5" | "GRADE_5" => Ok(GradeLevel::Grade5),
            "grade_6" | "GRADE_6" => Ok(GradeLevel::Grade6),
            "grade_7" | "GRADE_7" => Ok(GradeLevel::Grade7),
            "grade_8" | "GRADE_8" => Ok(GradeLevel::Grade8),
            "grade_9" | "GRADE_9" => Ok(GradeLevel::Grade9),
            "grade_10" | "GRADE_10" => Ok(GradeLevel::Grade10),
            "grade_11" | "GRADE_11" => Ok(GradeLevel::Grade11),
            "grade_12" | "GRADE_12" => Ok(GradeLevel::Grade12),
            _ => Err(format!("Unknown grade level: {}", s)),
        }
    }
}

impl std::fmt::Display for GradeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GradeLevel::K => write!(f, "K"),
            other => write!(f, "grade_{}", other.value()),
        }
    }
}

/// A skill in the curriculum graph. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub grade_level: GradeLevel,
    /// Position within the grade, used as the learning-journey tie-breaker.
    pub order: u32,
    /// Forgetting rate lambda for exponential strength decay.
    pub forgetting_rate: f64,
    /// Intrinsic difficulty on the same scale as memory strength.
    pub difficulty: f64,
    pub prerequisites: Vec<String>,
}

/// Raw skill record accepted by the graph loader. `order` may be absent, in
/// which case it is assigned by appearance within the grade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRecord {
    pub id: String,
    pub name: String,
    pub grade_level: GradeLevel,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default = "default_forgetting_rate")]
    pub forgetting_rate: f64,
    #[serde(default)]
    pub difficulty: f64,
    #[serde(default)]
    pub order: Option<u32>,
}

fn default_forgetting_rate() -> f64 {
    0.1
}

/// A question in the bank. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub skill_ids: Vec<String>,
    #[serde(default)]
    pub difficulty: f64,
    #[serde(default = "default_expected_time")]
    pub expected_time_seconds: f64,
}

fn default_expected_time() -> f64 {
    60.0
}

/// Per learner x skill memory state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillState {
    pub learner_id: String,
    pub skill_id: String,
    pub memory_strength: f64,
    pub last_practice_time: Option<DateTime<Utc>>,
    pub practice_count: u32,
    pub correct_count: u32,
}

impl SkillState {
    pub fn new_for_skill(learner_id: String, skill_id: String) -> Self {
        Self {
            learner_id,
            skill_id,
            memory_strength: 0.0,
            last_practice_time: None,
            practice_count: 0,
            correct_count: 0,
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.practice_count == 0 {
            0.0
        } else {
            self.correct_count as f64 / self.practice_count as f64
        }
    }
}

/// Append-only record of a question attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAttempt {
    pub learner_id: String,
    pub question_id: String,
    pub skill_ids: Vec<String>,
    pub is_correct: bool,
    pub response_time_seconds: f64,
    pub attempted_at: DateTime<Utc>,
}

/// Per-skill snapshot for progress reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillScore {
    pub skill_id: String,
    pub name: String,
    pub grade_level: GradeLevel,
    pub memory_strength: f64,
    pub probability: f64,
    pub practice_count: u32,
    pub correct_count: u32,
    pub accuracy: f64,
}

/// Conversational session record (persistent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub learner_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub last_activity_at: DateTime<Utc>,
    pub turn_count: i32,
    pub questions_attempted: i32,
}

impl Session {
    pub fn new(learner_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            learner_id,
            started_at,
            ended_at: None,
            active: true,
            last_activity_at: started_at,
            turn_count: 0,
            questions_attempted: 0,
        }
    }
}
