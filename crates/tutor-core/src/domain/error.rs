use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Unknown skill: {0}")]
    UnknownSkill(String),

    #[error("Skill {skill} references unknown prerequisite {prerequisite}")]
    UnknownPrerequisite { skill: String, prerequisite: String },

    #[error("Prerequisite cycle detected involving skill {0}")]
    PrerequisiteCycle(String),

    #[error("Unknown question: {0}")]
    UnknownQuestion(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Assessment already completed for learner {learner_id} in {subject}")]
    AssessmentAlreadyCompleted { learner_id: String, subject: String },

    #[error("Scheduler not ready")]
    NotReady,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
