//! The DASH scheduler: memory-decay model, performance analysis,
//! learning-journey recommendation, and adaptive question selection.
//! Everything here is pure with respect to the state store; callers fetch a
//! snapshot and get a decision (or "none") back.

pub mod decay;
pub mod performance;
pub mod recommend;
pub mod selection;

pub use decay::{
    correct_increment, decayed_strength, predict_correctness, time_penalty, STRENGTH_MAX,
    STRENGTH_MIN,
};
pub use performance::{analyze_recent, difficulty_offset, PerformanceAnalysis};
pub use recommend::{recommend_skills, RecommendationReport, RecommendedSkill, SkippedSkill};
pub use selection::{
    assessment_distribution, select_assessment, select_question, DIFFICULTY_WINDOW,
};
