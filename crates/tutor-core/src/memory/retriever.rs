//! Light and deep memory retrieval plus the reflection layer that turns
//! retrieved memories into at most one instruction for the external agent.

use crate::domain::{MemoryCategory, ScoredMemory};
use crate::memory::prompts;
use crate::memory::store::MemoryStore;
use crate::ports::language_model::strip_code_fence;
use crate::ports::LanguageModel;
use crate::runtime::sessions::SessionHandle;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

const LIGHT_TOP_K: usize = 10;
const DEEP_TOP_K_ACADEMIC: usize = 5;
const DEEP_TOP_K_OTHER: usize = 3;
/// Turns of context fed to deep-query synthesis and reflection.
const DEEP_CONTEXT_TURNS: usize = 10;
const REFLECTION_CONTEXT_TURNS: usize = 3;

const INJECTION_NOTE: &str = "Note: This instruction is based on retrieved memories from \
previous sessions.\nApply it naturally without explicitly mentioning these memories to the student.";

#[derive(Debug, Deserialize)]
struct RawRetrievalDecision {
    need_retrieval: bool,
    #[serde(default)]
    retrieval_query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDeepQuery {
    #[serde(default)]
    deep_query: String,
}

pub struct MemoryRetriever {
    llm: Arc<dyn LanguageModel>,
    deep_period_seconds: f64,
}

impl MemoryRetriever {
    pub fn new(llm: Arc<dyn LanguageModel>, deep_period_seconds: f64) -> Self {
        Self {
            llm,
            deep_period_seconds,
        }
    }

    /// Handle a (debounced) user turn: decide whether retrieval is needed,
    /// run the light search, and kick deep retrieval when its period has
    /// elapsed. Search failures leave empty caches; they never propagate.
    pub async fn on_user_turn(
        &self,
        store: &MemoryStore,
        session: &SessionHandle,
        user_text: &str,
        tutor_text: &str,
        now: DateTime<Utc>,
    ) {
        let session_id = {
            let state = session.lock().await;
            state.context.session_id.clone()
        };

        let decision = self.analyze_light_retrieval(user_text, tutor_text).await;

        let light = if decision.need {
            tracing::info!(
                session_id,
                query = %decision.query,
                original = user_text,
                "running light retrieval"
            );
            match store
                .search(&decision.query, None, LIGHT_TOP_K, Some(&session_id))
                .await
            {
                Ok(results) => results,
                Err(err) => {
                    tracing::error!(session_id, error = %err, "light retrieval failed");
                    Vec::new()
                }
            }
        } else {
            tracing::info!(session_id, text = user_text, "skipping retrieval for this turn");
            Vec::new()
        };

        let run_deep = {
            let mut state = session.lock().await;
            state.caches.light = light;
            match state.caches.last_deep_at {
                None => {
                    // Arm the deep timer on first activity.
                    state.caches.last_deep_at = Some(now);
                    false
                }
                Some(last) => {
                    (now - last).num_milliseconds() as f64 / 1000.0 >= self.deep_period_seconds
                }
            }
        };

        if run_deep {
            self.deep_retrieval(store, session, now).await;
        }
    }

    /// Ask the model whether this turn warrants retrieval and with what
    /// query. Any failure falls back to retrieving with the raw user text.
    async fn analyze_light_retrieval(&self, user_text: &str, tutor_text: &str) -> LightDecision {
        if user_text.trim().is_empty() {
            return LightDecision {
                need: false,
                query: String::new(),
            };
        }

        let fallback = LightDecision {
            need: true,
            query: user_text.to_string(),
        };

        let tutor_context = if tutor_text.is_empty() {
            "Startup/Greeting"
        } else {
            tutor_text
        };
        let prompt = prompts::light_retrieval_prompt(user_text, tutor_context);
        let response = match self.llm.generate(&prompt).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "retrieval analysis failed, using raw query");
                return fallback;
            }
        };

        match serde_json::from_str::<RawRetrievalDecision>(strip_code_fence(&response)) {
            Ok(raw) => LightDecision {
                need: raw.need_retrieval,
                query: raw
                    .retrieval_query
                    .filter(|q| !q.trim().is_empty())
                    .unwrap_or_else(|| user_text.to_string()),
            },
            Err(_) => {
                tracing::warn!("unparseable retrieval analysis, using raw query");
                fallback
            }
        }
    }

    /// Thematic retrieval across all four categories in parallel, driven by
    /// an LLM-synthesized query over the recent conversation.
    async fn deep_retrieval(&self, store: &MemoryStore, session: &SessionHandle, now: DateTime<Utc>) {
        let (conversation, session_id) = {
            let state = session.lock().await;
            (
                state.context.recent_text(DEEP_CONTEXT_TURNS),
                state.context.session_id.clone(),
            )
        };
        if conversation.trim().is_empty() {
            tracing::debug!(session_id, "no conversation yet, skipping deep retrieval");
            return;
        }

        let query = self.synthesize_deep_query(&conversation).await;
        tracing::info!(session_id, query = %query, "running deep retrieval");

        let search = |category: MemoryCategory| {
            let top_k = if category == MemoryCategory::Academic {
                DEEP_TOP_K_ACADEMIC
            } else {
                DEEP_TOP_K_OTHER
            };
            let query = query.clone();
            let session_id = session_id.clone();
            async move {
                match store.search(&query, Some(category), top_k, Some(&session_id)).await {
                    Ok(results) => results,
                    Err(err) => {
                        tracing::error!(%category, error = %err, "deep retrieval category failed");
                        Vec::new()
                    }
                }
            }
        };

        let (academic, personal, preference, context) = tokio::join!(
            search(MemoryCategory::Academic),
            search(MemoryCategory::Personal),
            search(MemoryCategory::Preference),
            search(MemoryCategory::Context),
        );

        let total = academic.len() + personal.len() + preference.len() + context.len();
        let mut state = session.lock().await;
        state.caches.deep.insert(MemoryCategory::Academic, academic);
        state.caches.deep.insert(MemoryCategory::Personal, personal);
        state.caches.deep.insert(MemoryCategory::Preference, preference);
        state.caches.deep.insert(MemoryCategory::Context, context);
        state.caches.last_deep_at = Some(now);
        tracing::info!(session_id, total, "deep retrieval complete");
    }

    async fn synthesize_deep_query(&self, conversation: &str) -> String {
        // Bound the prompt size; the tail of the window is the freshest.
        let window: String = conversation.chars().take(2000).collect();
        match self.llm.generate(&prompts::deep_query_prompt(&window)).await {
            Ok(text) => match serde_json::from_str::<RawDeepQuery>(strip_code_fence(&text)) {
                Ok(raw) if !raw.deep_query.trim().is_empty() => raw.deep_query,
                _ => conversation.to_string(),
            },
            Err(err) => {
                tracing::warn!(error = %err, "deep query synthesis failed, using raw window");
                conversation.to_string()
            }
        }
    }

    /// The reflection layer. Collect never-injected candidates from the light
    /// and deep caches (marking them injected), synthesize one instruction,
    /// and clear the caches on success. Returns the instruction body, or None
    /// when nothing should be injected.
    pub async fn build_injection(&self, session: &SessionHandle) -> Option<String> {
        let (candidates, context_block, session_id) = {
            let mut state = session.lock().await;

            let mut candidates: Vec<ScoredMemory> = Vec::new();
            let light = state.caches.light.clone();
            for result in light {
                if state.injected.insert(result.memory.id.clone()) {
                    candidates.push(result);
                }
            }
            for category in MemoryCategory::ALL {
                let results = state.caches.deep.get(&category).cloned().unwrap_or_default();
                for result in results {
                    if state.injected.insert(result.memory.id.clone()) {
                        candidates.push(result);
                    }
                }
            }

            (
                candidates,
                state.context.recent_context(REFLECTION_CONTEXT_TURNS),
                state.context.session_id.clone(),
            )
        };

        if candidates.is_empty() {
            tracing::info!(session_id, "no new memories available for injection");
            return None;
        }

        let instruction = self.synthesize_instruction(&candidates, &context_block).await?;

        // Clearing at injection time keeps delivery at-most-once: the next
        // injection is driven entirely by fresh retrievals.
        {
            let mut state = session.lock().await;
            state.caches.clear();
        }

        tracing::info!(session_id, "instruction ready for injection");
        Some(format!("{instruction}\n\n{INJECTION_NOTE}"))
    }

    /// One LLM call turning candidate memories into a single instruction.
    /// The sentinel "NONE" (or any failure) suppresses injection.
    async fn synthesize_instruction(
        &self,
        memories: &[ScoredMemory],
        conversation_context: &str,
    ) -> Option<String> {
        if memories.is_empty() {
            return None;
        }

        let block: String = memories
            .iter()
            .map(|m| format!("- {}", m.memory.text))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = prompts::reflection_prompt(&block, conversation_context);

        match self.llm.generate(&prompt).await {
            Ok(text) => {
                let instruction = text.trim().to_string();
                if instruction.is_empty() || instruction.eq_ignore_ascii_case("NONE") {
                    tracing::info!("reflection declined to inject");
                    None
                } else {
                    Some(instruction)
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "reflection synthesis failed, suppressing injection");
                None
            }
        }
    }
}

struct LightDecision {
    need: bool,
    query: String,
}
