pub mod error;
pub mod events;
pub mod memory;
pub mod models;

pub use error::DomainError;
pub use events::{EventKind, SessionEvent, Speaker};
pub use memory::{
    BatchStats, ClosingArtifact, ConversationTranscript, ConversationTurn, Exchange,
    ExtractionResult, MemoryCategory, MemoryRecord, OpeningArtifact, SaveOutcome, ScoredMemory,
};
pub use models::{
    GradeLevel, Question, QuestionAttempt, Session, Skill, SkillRecord, SkillScore, SkillState,
};
