pub mod config;
pub mod domain;
pub mod graph;
pub mod memory;
pub mod ports;
pub mod providers;
pub mod question_index;
pub mod resilience;
pub mod runtime;
pub mod scheduler;
pub mod services;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use config::{
    DashConfig, MemoryConfig, PathsConfig, PipelineConfig, ProviderConfig, ResilienceConfig,
    TutorConfig,
};

pub use domain::{
    BatchStats, ClosingArtifact, ConversationTranscript, ConversationTurn, DomainError, EventKind,
    Exchange, ExtractionResult, GradeLevel, MemoryCategory, MemoryRecord, OpeningArtifact,
    Question, QuestionAttempt, SaveOutcome, ScoredMemory, Session, SessionEvent, Skill,
    SkillRecord, SkillScore, SkillState, Speaker,
};

pub use graph::SkillGraph;
pub use question_index::QuestionIndex;

pub use ports::{
    ArtifactStore, EmbeddingProvider, LanguageModel, LearnerStateRepository, SessionRepository,
    VectorIndex, VectorIndexProvider, VectorMatch, VectorQuery, VectorRecord,
};

pub use scheduler::{
    analyze_recent, assessment_distribution, decayed_strength, difficulty_offset,
    predict_correctness, recommend_skills, select_assessment, select_question,
    PerformanceAnalysis, RecommendationReport, RecommendedSkill, STRENGTH_MAX, STRENGTH_MIN,
};

pub use services::{LearningService, SchedulerService};

pub use memory::{
    sanitize_index_name, Consolidator, MemoryExtractor, MemoryRetriever, MemoryStore,
    MemoryStoreRegistry,
};

pub use resilience::{CircuitBreaker, ResilientLlm, RetryPolicy};

pub use runtime::{
    EventPipeline, EventQueue, InactivityCheck, InjectionManager, QueuedInstruction,
    SessionContext, SessionRegistry, SessionSkill, SkillSet, TeachingAssistant,
};

pub use providers::{GeminiClient, GeminiEmbedder, ServerlessIndexProvider};
