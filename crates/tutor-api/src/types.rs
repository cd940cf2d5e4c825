//! Wire-level DTOs for host applications embedding the tutor backend.

use serde::{Deserialize, Serialize};
use tutor_core::{GradeLevel, Question, QueuedInstruction, Session, SkillScore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedQuestionDto {
    pub question_id: String,
    pub skill_ids: Vec<String>,
    pub difficulty: f64,
    pub expected_time_seconds: f64,
}

impl From<Question> for SelectedQuestionDto {
    fn from(question: Question) -> Self {
        Self {
            question_id: question.id,
            skill_ids: question.skill_ids,
            difficulty: question.difficulty,
            expected_time_seconds: question.expected_time_seconds,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttemptRequest {
    pub learner_id: String,
    pub question_id: String,
    pub skill_ids: Vec<String>,
    pub is_correct: bool,
    pub response_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptAck {
    pub success: bool,
    pub affected_skills: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssessmentRequest {
    pub learner_id: String,
    pub subject: String,
    pub grade_level: GradeLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStarted {
    pub session_id: String,
    pub greeting: String,
}

impl SessionStarted {
    pub fn new(session: &Session, greeting: String) -> Self {
        Self {
            session_id: session.id.clone(),
            greeting,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionClosed {
    pub session_id: String,
    pub closing: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstructionDto {
    pub id: String,
    pub session_id: String,
    pub text: String,
}

impl From<QueuedInstruction> for InstructionDto {
    fn from(instruction: QueuedInstruction) -> Self {
        Self {
            id: instruction.id,
            session_id: instruction.session_id,
            text: instruction.text,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub learner_id: String,
    pub scores: Vec<SkillScore>,
}
