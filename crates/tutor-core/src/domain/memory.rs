use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::events::Speaker;

/// Long-term memory category. Each category maps to its own namespace inside
/// a learner's vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Academic,
    Personal,
    Preference,
    Context,
}

impl MemoryCategory {
    pub const ALL: [MemoryCategory; 4] = [
        MemoryCategory::Academic,
        MemoryCategory::Personal,
        MemoryCategory::Preference,
        MemoryCategory::Context,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Academic => "academic",
            MemoryCategory::Personal => "personal",
            MemoryCategory::Preference => "preference",
            MemoryCategory::Context => "context",
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s {
            "academic" => Ok(MemoryCategory::Academic),
            "personal" => Ok(MemoryCategory::Personal),
            "preference" => Ok(MemoryCategory::Preference),
            "context" => Ok(MemoryCategory::Context),
            _ => Err(format!("Unknown memory category: {}", s)),
        }
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable fact about the learner, stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub category: MemoryCategory,
    pub text: String,
    pub importance: f64,
    pub learner_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    /// Reinforcement counter, >= 1.
    pub counter: u32,
    /// Epoch seconds of first and most recent sighting.
    pub first_epoch: f64,
    pub last_epoch: f64,
    /// Free-form extracted fields (emotion, topic, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl MemoryRecord {
    pub fn new(
        category: MemoryCategory,
        text: String,
        importance: f64,
        learner_id: String,
        session_id: String,
    ) -> Self {
        let now = Utc::now();
        let epoch = now.timestamp_millis() as f64 / 1000.0;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            text,
            importance,
            learner_id,
            session_id,
            created_at: now,
            counter: 1,
            first_epoch: epoch,
            last_epoch: epoch,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A memory returned from search with its component scores.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: MemoryRecord,
    pub similarity: f64,
    pub recency: f64,
    pub importance: f64,
    pub final_score: f64,
}

/// Outcome of a single deduplicating write.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Created,
    Updated { existing_id: String, counter: u32 },
    Filtered,
}

/// Statistics for a batch write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub processed: usize,
    pub new_created: usize,
    pub duplicates_updated: usize,
    pub filtered: usize,
    pub errors: usize,
}

/// A buffered user/tutor exchange awaiting batch extraction.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub learner_text: String,
    pub tutor_text: String,
    pub topic: String,
}

/// Parsed output of one batched extraction call.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub memories: Vec<MemoryRecord>,
    pub emotions: Vec<String>,
    pub key_moments: Vec<String>,
    pub unfinished_topics: Vec<String>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
            && self.emotions.is_empty()
            && self.key_moments.is_empty()
            && self.unfinished_topics.is_empty()
    }
}

/// One logical turn of the conversation after merge/normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// The full turn history persisted at session end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTranscript {
    pub session_id: String,
    pub learner_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub turn_count: u32,
    pub turns: Vec<ConversationTurn>,
}

/// Artifact read at the start of the next session, then cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpeningArtifact {
    pub welcome_hook: String,
    pub last_session_summary: String,
    pub unfinished_threads: Vec<String>,
    pub personal_relevance: String,
    pub emotional_state_last: String,
    pub suggested_opener: String,
    pub timestamp: f64,
}

/// Artifact summarizing a finished (or in-progress) session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClosingArtifact {
    pub session_id: String,
    pub timestamp: f64,
    pub new_memories: Vec<MemoryRecord>,
    pub emotional_arc: Vec<String>,
    pub key_moments: Vec<String>,
    pub unfinished_topics: Vec<String>,
    pub topics_covered: Vec<String>,
    pub session_summary: String,
    pub goodbye_message: String,
    pub next_session_hooks: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_string_roundtrip() {
        for cat in MemoryCategory::ALL {
            assert_eq!(MemoryCategory::parse(cat.as_str()).unwrap(), cat);
        }
        assert!(MemoryCategory::parse("nonsense").is_err());
    }

    #[test]
    fn new_memory_starts_with_counter_one_and_matching_epochs() {
        let mem = MemoryRecord::new(
            MemoryCategory::Academic,
            "Understands chain rule".into(),
            0.6,
            "learner-1".into(),
            "session-1".into(),
        );
        assert_eq!(mem.counter, 1);
        assert!((mem.first_epoch - mem.last_epoch).abs() < f64::EPSILON);
    }
}
