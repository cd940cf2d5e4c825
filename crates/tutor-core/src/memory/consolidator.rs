//! Session consolidation: buffer exchanges, extract memories in batches,
//! keep a running closing cache, and at session end emit the closing
//! artifact plus a background-generated opening artifact for next time.

use crate::domain::{ClosingArtifact, Exchange, MemoryCategory, MemoryRecord, OpeningArtifact};
use crate::memory::extractor::MemoryExtractor;
use crate::memory::prompts;
use crate::memory::store::MemoryStore;
use crate::ports::language_model::strip_code_fence;
use crate::ports::{ArtifactStore, LanguageModel};
use crate::runtime::sessions::SessionHandle;
use anyhow::Result;
use chrono::{Timelike, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Running closing cache for one session. Lives inside the session state,
/// guarded by the session lock.
#[derive(Debug, Clone, Default)]
pub struct ClosingState {
    pub exchange_buffer: Vec<Exchange>,
    pub emotional_arc: Vec<String>,
    pub key_moments: Vec<String>,
    pub unfinished_topics: Vec<String>,
    pub topics_covered: Vec<String>,
    pub session_summary: String,
    pub goodbye_message: String,
    pub next_session_hooks: Vec<String>,
    pub new_memories: Vec<MemoryRecord>,
}

impl ClosingState {
    pub fn to_artifact(&self, session_id: &str) -> ClosingArtifact {
        ClosingArtifact {
            session_id: session_id.to_string(),
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
            new_memories: self.new_memories.clone(),
            emotional_arc: self.emotional_arc.clone(),
            key_moments: self.key_moments.clone(),
            unfinished_topics: self.unfinished_topics.clone(),
            topics_covered: self.topics_covered.clone(),
            session_summary: self.session_summary.clone(),
            goodbye_message: self.goodbye_message.clone(),
            next_session_hooks: self.next_session_hooks.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClosing {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    goodbye: String,
    #[serde(default)]
    hooks: Vec<String>,
}

pub struct Consolidator {
    llm: Arc<dyn LanguageModel>,
    extractor: Arc<MemoryExtractor>,
    artifacts: Arc<dyn ArtifactStore>,
    batch_size: usize,
}

impl Consolidator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        extractor: Arc<MemoryExtractor>,
        artifacts: Arc<dyn ArtifactStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            llm,
            extractor,
            artifacts,
            batch_size: batch_size.max(1),
        }
    }

    /// Buffer one exchange; once the batch threshold is reached, run the
    /// extraction batch. `extraction_lock` serializes this against the
    /// session-end flush.
    pub async fn update_after_exchange(
        &self,
        store: &MemoryStore,
        session: &SessionHandle,
        extraction_lock: &Mutex<()>,
        learner_text: &str,
        tutor_text: &str,
        topic: &str,
    ) -> Result<()> {
        if learner_text.is_empty() || tutor_text.is_empty() {
            tracing::warn!(
                has_learner_text = !learner_text.is_empty(),
                has_tutor_text = !tutor_text.is_empty(),
                "exchange missing one side, not buffering"
            );
            return Ok(());
        }

        let ready = {
            let mut state = session.lock().await;
            let topic = if topic.is_empty() { "general" } else { topic };
            state.closing.exchange_buffer.push(Exchange {
                learner_text: learner_text.to_string(),
                tutor_text: tutor_text.to_string(),
                topic: topic.to_string(),
            });
            if !state.closing.topics_covered.iter().any(|t| t == topic) {
                state.closing.topics_covered.push(topic.to_string());
            }
            state.closing.exchange_buffer.len() >= self.batch_size
        };

        if ready {
            let _guard = extraction_lock.lock().await;
            self.process_exchange_batch(store, session).await?;
        }
        Ok(())
    }

    /// Drain the buffer, extract, persist the memories, fold the analysis
    /// into the closing cache, then regenerate the closing artifacts. The
    /// buffer is cleared even when extraction fails.
    async fn process_exchange_batch(&self, store: &MemoryStore, session: &SessionHandle) -> Result<()> {
        let (exchanges, session_id, learner_id) = {
            let mut state = session.lock().await;
            let exchanges = std::mem::take(&mut state.closing.exchange_buffer);
            (
                exchanges,
                state.context.session_id.clone(),
                state.context.learner_id.clone(),
            )
        };
        if exchanges.is_empty() {
            return Ok(());
        }

        tracing::info!(
            session_id,
            batch = exchanges.len(),
            "processing exchange batch for memory extraction"
        );
        let extraction = self
            .extractor
            .extract_batch(&exchanges, &learner_id, &session_id)
            .await;

        if !extraction.memories.is_empty() {
            let stats = store.save_batch(extraction.memories.clone()).await;
            tracing::info!(session_id, ?stats, "persisted extracted memories");
        }

        {
            let mut state = session.lock().await;
            state.closing.emotional_arc.extend(extraction.emotions);
            state.closing.key_moments.extend(extraction.key_moments);
            state
                .closing
                .unfinished_topics
                .extend(extraction.unfinished_topics);
            state.closing.new_memories.extend(extraction.memories);
        }

        self.regenerate_closing(session).await;
        Ok(())
    }

    /// Regenerate summary/goodbye/hooks from the cache and persist the
    /// closing artifact. LLM failure leaves the previous values in place.
    pub async fn regenerate_closing(&self, session: &SessionHandle) {
        let (snapshot, session_id, learner_id) = {
            let state = session.lock().await;
            (
                state.closing.clone(),
                state.context.session_id.clone(),
                state.context.learner_id.clone(),
            )
        };

        let join = |items: &[String], sep: &str| {
            if items.is_empty() {
                "None".to_string()
            } else {
                items.join(sep)
            }
        };
        let current_emotion = snapshot
            .emotional_arc
            .last()
            .cloned()
            .unwrap_or_else(|| "neutral".to_string());
        let topics = if snapshot.topics_covered.is_empty() {
            "general topics".to_string()
        } else {
            snapshot.topics_covered.join(", ")
        };

        let prompt = prompts::closing_artifacts_prompt(
            &topics,
            &join(&snapshot.key_moments, ", "),
            &join(&snapshot.emotional_arc, " -> "),
            &current_emotion,
            &join(&snapshot.unfinished_topics, ", "),
        );

        let parsed: Option<RawClosing> = match self.llm.generate(&prompt).await {
            Ok(text) => serde_json::from_str(strip_code_fence(&text)).ok(),
            Err(err) => {
                tracing::warn!(error = %err, "closing regeneration call failed");
                None
            }
        };

        {
            let mut state = session.lock().await;
            if let Some(data) = parsed {
                if !data.summary.is_empty() {
                    state.closing.session_summary = data.summary;
                }
                if !data.goodbye.is_empty() {
                    state.closing.goodbye_message = data.goodbye;
                }
                if !data.hooks.is_empty() {
                    // Real unfinished topics lead; generated hooks fill to 3.
                    let mut hooks: Vec<String> =
                        state.closing.unfinished_topics.iter().take(2).cloned().collect();
                    for hook in data.hooks {
                        if hooks.len() >= 3 {
                            break;
                        }
                        if !hooks.contains(&hook) {
                            hooks.push(hook);
                        }
                    }
                    state.closing.next_session_hooks = hooks;
                }
            }
        }

        let artifact = {
            let state = session.lock().await;
            state.closing.to_artifact(&state.context.session_id)
        };
        if let Err(err) = self.artifacts.save_closing(&learner_id, &artifact).await {
            tracing::error!(session_id, error = %err, "failed to save closing artifact");
        }
    }

    /// Session-end consolidation: flush whatever is still buffered, run a
    /// final regeneration, and return the closing artifact. The caller spawns
    /// `generate_and_save_opening` as a detached task so session end returns
    /// immediately.
    pub async fn consolidate_session(
        &self,
        store: &MemoryStore,
        session: &SessionHandle,
        extraction_lock: &Mutex<()>,
    ) -> Result<ClosingArtifact> {
        {
            let _guard = extraction_lock.lock().await;
            if let Err(err) = self.process_exchange_batch(store, session).await {
                tracing::error!(error = %err, "final exchange flush failed");
            }
        }
        self.regenerate_closing(session).await;

        let (artifact, learner_id, memory_count) = {
            let state = session.lock().await;
            (
                state.closing.to_artifact(&state.context.session_id),
                state.context.learner_id.clone(),
                state.closing.new_memories.len(),
            )
        };

        tracing::info!(
            session_id = %artifact.session_id,
            learner_id,
            memories = memory_count,
            key_moments = artifact.key_moments.len(),
            unfinished = artifact.unfinished_topics.len(),
            "session consolidation complete"
        );
        Ok(artifact)
    }

    /// Build the opening artifact for the learner's next session and persist
    /// it. Runs detached after session end; every LLM failure degrades to an
    /// empty field rather than an error.
    pub async fn generate_and_save_opening(
        self: Arc<Self>,
        store: Arc<MemoryStore>,
        learner_id: String,
        closing: ClosingArtifact,
    ) {
        let opening = self.generate_opening(&store, &closing).await;
        if let Err(err) = self.artifacts.save_opening(&learner_id, &opening).await {
            tracing::error!(learner_id, error = %err, "failed to save opening artifact");
        } else {
            tracing::info!(learner_id, "opening artifact ready for next session");
        }
    }

    async fn generate_text(&self, prompt: &str, label: &str) -> String {
        match self.llm.generate(prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                tracing::warn!(label, error = %err, "opening field generation failed");
                String::new()
            }
        }
    }

    async fn generate_opening(&self, store: &MemoryStore, closing: &ClosingArtifact) -> OpeningArtifact {
        let emotional_state_last = closing
            .emotional_arc
            .last()
            .cloned()
            .unwrap_or_else(|| "neutral".to_string());

        let personal_relevance = self.generate_personal_relevance(store).await;

        let welcome_hook = if closing.session_summary.is_empty() && closing.key_moments.is_empty() {
            String::new()
        } else {
            let achievement = closing.key_moments.last().cloned().unwrap_or_default();
            self.generate_text(
                &prompts::welcome_hook_prompt(
                    &closing.session_summary,
                    &achievement,
                    &emotional_state_last,
                ),
                "welcome_hook",
            )
            .await
        };

        let unfinished_threads: Vec<String> =
            closing.unfinished_topics.iter().take(3).cloned().collect();

        let suggested_opener = if closing.session_summary.is_empty()
            && personal_relevance.is_empty()
            && unfinished_threads.is_empty()
        {
            String::new()
        } else {
            self.generate_text(
                &prompts::suggested_opener_prompt(
                    &closing.session_summary,
                    &emotional_state_last,
                    &personal_relevance,
                    &unfinished_threads.join(", "),
                ),
                "suggested_opener",
            )
            .await
        };

        OpeningArtifact {
            welcome_hook,
            last_session_summary: closing.session_summary.clone(),
            unfinished_threads,
            personal_relevance,
            emotional_state_last,
            suggested_opener,
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }

    async fn generate_personal_relevance(&self, store: &MemoryStore) -> String {
        let personal = match store
            .search(
                "personal information about student schedule hobbies recurring events",
                Some(MemoryCategory::Personal),
                5,
                None,
            )
            .await
        {
            Ok(results) if !results.is_empty() => results,
            Ok(_) => return String::new(),
            Err(err) => {
                tracing::warn!(error = %err, "personal memory search failed");
                return String::new();
            }
        };

        let now = chrono::Local::now();
        let day_name = now.format("%A").to_string();
        let time_of_day = match now.hour() {
            0..=11 => "morning",
            12..=16 => "afternoon",
            _ => "evening",
        };
        let texts: Vec<&str> = personal
            .iter()
            .take(3)
            .map(|m| m.memory.text.as_str())
            .collect();

        self.generate_text(
            &prompts::personal_relevance_prompt(&day_name, time_of_day, &texts.join(", ")),
            "personal_relevance",
        )
        .await
    }
}
