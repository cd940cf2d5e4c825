//! LLM-backed batch extraction of durable memories from dialog exchanges.
//! One call per batch; malformed output degrades to an empty result rather
//! than surfacing into the pipeline.

use crate::domain::{Exchange, ExtractionResult, MemoryCategory, MemoryRecord};
use crate::memory::prompts;
use crate::ports::language_model::strip_code_fence;
use crate::ports::LanguageModel;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    memories: Vec<RawMemory>,
    #[serde(default)]
    emotions: Vec<String>,
    #[serde(default)]
    key_moments: Vec<String>,
    #[serde(default)]
    unfinished_topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawMemory {
    #[serde(rename = "type", default)]
    category: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    importance: Option<f64>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

pub struct MemoryExtractor {
    llm: Arc<dyn LanguageModel>,
}

impl MemoryExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Extract memories, emotions, key moments, and unfinished topics from a
    /// batch of exchanges. Never errors: LLM failures and malformed JSON both
    /// return an empty result.
    pub async fn extract_batch(
        &self,
        exchanges: &[Exchange],
        learner_id: &str,
        session_id: &str,
    ) -> ExtractionResult {
        if exchanges.is_empty() {
            tracing::warn!("extract_batch called with no exchanges");
            return ExtractionResult::default();
        }

        let prompt = prompts::extraction_prompt(exchanges);
        let response = match self.llm.generate(&prompt).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "extraction call failed, returning empty result");
                return ExtractionResult::default();
            }
        };

        match Self::parse(&response, learner_id, session_id) {
            Some(result) => {
                tracing::info!(
                    exchanges = exchanges.len(),
                    memories = result.memories.len(),
                    emotions = result.emotions.len(),
                    key_moments = result.key_moments.len(),
                    unfinished_topics = result.unfinished_topics.len(),
                    "extraction batch parsed"
                );
                result
            }
            None => {
                tracing::error!("malformed extraction JSON, returning empty result");
                ExtractionResult::default()
            }
        }
    }

    fn parse(response: &str, learner_id: &str, session_id: &str) -> Option<ExtractionResult> {
        let raw: RawExtraction = serde_json::from_str(strip_code_fence(response)).ok()?;

        let memories = raw
            .memories
            .into_iter()
            .filter(|m| !m.text.trim().is_empty())
            .map(|m| {
                let category = m
                    .category
                    .as_deref()
                    .and_then(|c| MemoryCategory::parse(c).ok())
                    .unwrap_or(MemoryCategory::Academic);
                MemoryRecord::new(
                    category,
                    m.text.trim().to_string(),
                    m.importance.unwrap_or(0.5).clamp(0.0, 1.0),
                    learner_id.to_string(),
                    session_id.to_string(),
                )
                .with_metadata(m.metadata)
            })
            .collect();

        Some(ExtractionResult {
            memories,
            emotions: raw
                .emotions
                .into_iter()
                .filter(|e| !e.is_empty() && e != "neutral")
                .collect(),
            key_moments: raw
                .key_moments
                .into_iter()
                .filter(|k| !k.is_empty() && k != "None")
                .collect(),
            unfinished_topics: raw
                .unfinished_topics
                .into_iter()
                .filter(|t| !t.is_empty() && t != "None")
                .collect(),
        })
    }
}
