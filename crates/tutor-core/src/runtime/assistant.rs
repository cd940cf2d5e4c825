//! Session lifecycle orchestration: start/end, memory-aware greetings and
//! closings, and the background retrieval/extraction tasks triggered by
//! transcript events.

use crate::config::TutorConfig;
use crate::domain::{
    ConversationTranscript, EventKind, OpeningArtifact, Session, SessionEvent, Speaker,
};
use crate::memory::{Consolidator, MemoryRetriever, MemoryStoreRegistry};
use crate::ports::{ArtifactStore, SessionRepository};
use crate::runtime::injection::InjectionManager;
use crate::runtime::sessions::{SessionHandle, SessionRegistry};
use crate::runtime::skills::SkillSet;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};

const GREETING_PREFIX: &str = "[SYSTEM PROMPT]";
pub const INSTRUCTION_PREFIX: &str = "[SYSTEM INSTRUCTION]";

pub struct TeachingAssistant {
    config: TutorConfig,
    sessions: SessionRegistry,
    session_repo: Arc<dyn SessionRepository>,
    artifacts: Arc<dyn ArtifactStore>,
    stores: Arc<MemoryStoreRegistry>,
    retriever: Arc<MemoryRetriever>,
    consolidator: Arc<Consolidator>,
    injections: Arc<InjectionManager>,
    skills: SkillSet,
    /// Bounds concurrent background work (extraction, retrieval, file I/O).
    io_budget: Arc<Semaphore>,
}

impl TeachingAssistant {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: TutorConfig,
        session_repo: Arc<dyn SessionRepository>,
        artifacts: Arc<dyn ArtifactStore>,
        stores: Arc<MemoryStoreRegistry>,
        retriever: Arc<MemoryRetriever>,
        consolidator: Arc<Consolidator>,
        injections: Arc<InjectionManager>,
        skills: SkillSet,
    ) -> Self {
        let sessions = SessionRegistry::new(
            config.pipeline.max_sessions,
            config.pipeline.max_history_per_session,
            config.pipeline.max_injected_ids,
        );
        let io_budget = Arc::new(Semaphore::new(config.pipeline.io_workers.max(1)));
        Self {
            config,
            sessions,
            session_repo,
            artifacts,
            stores,
            retriever,
            consolidator,
            injections,
            skills,
            io_budget,
        }
    }

    pub fn injections(&self) -> &Arc<InjectionManager> {
        &self.injections
    }

    pub fn session_registry(&self) -> &SessionRegistry {
        &self.sessions
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start a session: persist it, create in-memory state, and queue a
    /// greeting. The greeting is memory-aware when an opening artifact is
    /// available; a fresh artifact still being generated by the previous
    /// session's background task is awaited briefly.
    pub async fn start_session(&self, learner_id: &str) -> Result<(Session, String)> {
        let now = Utc::now();
        let session = Session::new(learner_id.to_string(), now);
        self.session_repo.create_session(&session).await?;

        let handle = self.sessions.create(&session.id, learner_id, now);

        let opening = self.await_opening(learner_id).await;
        if opening.is_some() {
            if let Err(err) = self.artifacts.clear_opening(learner_id).await {
                tracing::warn!(learner_id, error = %err, "failed to clear opening artifact");
            }
        }
        let greeting = compose_greeting(opening.as_ref());

        // The greeting is part of the conversation from the agent side.
        {
            let mut state = handle.lock().await;
            state.context.add_turn(Speaker::Tutor, &greeting, now);
        }
        self.injections.push_raw(&session.id, &greeting);

        tracing::info!(
            session_id = %session.id,
            learner_id,
            memory_aware = opening.is_some(),
            "session started"
        );
        Ok((session, greeting))
    }

    /// Poll for the opening artifact up to the configured window. Handles the
    /// race where a session restarts before the previous session's background
    /// opening generation has landed.
    async fn await_opening(&self, learner_id: &str) -> Option<OpeningArtifact> {
        let deadline =
            Instant::now() + Duration::from_secs_f64(self.config.pipeline.opening_poll_seconds);
        loop {
            match self.artifacts.load_opening(learner_id).await {
                Ok(Some(opening)) => return Some(opening),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(learner_id, error = %err, "opening artifact load failed");
                    return None;
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// End a session: persist the transcript, consolidate memories, kick off
    /// opening-artifact generation in the background, and queue the closing
    /// prompt. The caller gets the closing prompt immediately; only the
    /// consolidation flush is awaited.
    pub async fn end_session(&self, session_id: &str) -> Result<String> {
        let now = Utc::now();
        let session = self
            .session_repo
            .get_session(session_id)
            .await?
            .ok_or_else(|| crate::domain::DomainError::SessionNotFound(session_id.to_string()))?;
        let learner_id = session.learner_id.clone();

        let handle = self.sessions.get(session_id);
        let mut closing_prompt = fallback_closing(&session, now);

        if let Some(handle) = &handle {
            self.save_transcript(&learner_id, handle, now).await;

            match self.stores.get_or_open(&learner_id).await {
                Ok(store) => {
                    let extraction_lock = self
                        .sessions
                        .extraction_lock(session_id)
                        .unwrap_or_else(|| Arc::new(Mutex::new(())));
                    match self
                        .consolidator
                        .consolidate_session(&store, handle, &extraction_lock)
                        .await
                    {
                        Ok(artifact) => {
                            if !artifact.goodbye_message.is_empty() {
                                closing_prompt = compose_closing(
                                    &artifact.goodbye_message,
                                    &artifact.next_session_hooks,
                                );
                            }
                            // Detached: session end must not wait on LLM calls.
                            let consolidator = Arc::clone(&self.consolidator);
                            let learner = learner_id.clone();
                            tokio::spawn(consolidator.generate_and_save_opening(
                                store,
                                learner,
                                artifact,
                            ));
                        }
                        Err(err) => {
                            tracing::error!(session_id, error = %err, "consolidation failed");
                        }
                    }
                }
                Err(err) => {
                    tracing::error!(session_id, error = %err, "memory store unavailable at session end");
                }
            }
        }

        self.session_repo.end_session(session_id, now).await?;
        self.sessions.remove(session_id);
        self.injections.push_raw(session_id, &closing_prompt);

        tracing::info!(session_id, learner_id, "session ended");
        Ok(closing_prompt)
    }

    async fn save_transcript(&self, learner_id: &str, handle: &SessionHandle, now: DateTime<Utc>) {
        let transcript = {
            let state = handle.lock().await;
            ConversationTranscript {
                session_id: state.context.session_id.clone(),
                learner_id: learner_id.to_string(),
                started_at: state.context.started_at,
                ended_at: now,
                turn_count: state.context.turn_count,
                turns: state.context.turns.clone(),
            }
        };
        let _permit = self.io_budget.acquire().await;
        if let Err(err) = self.artifacts.save_conversation(learner_id, &transcript).await {
            tracing::error!(learner_id, error = %err, "failed to save conversation transcript");
        }
    }

    /// Count a question attempt against the session.
    pub async fn record_question_answered(&self, session_id: &str) -> Result<()> {
        self.session_repo.record_question(session_id).await?;
        if let Some(handle) = self.sessions.get(session_id) {
            let mut state = handle.lock().await;
            state.context.questions_attempted += 1;
        }
        Ok(())
    }

    // ========================================================================
    // Event handling (called by the pipeline)
    // ========================================================================

    /// Handle one dequeued event. Errors are contained here: a failing event
    /// must not halt the loop.
    pub async fn handle_event(&self, event: SessionEvent) {
        match &event.kind {
            EventKind::SessionStart => {
                // Session setup and greeting happen through start_session;
                // the queued event exists only for ordering.
            }
            EventKind::SessionEnd => {
                if let Err(err) = self.end_session(&event.session_id).await {
                    tracing::error!(session_id = %event.session_id, error = %err, "session end via event failed");
                }
            }
            EventKind::Text { speaker, text, topic } => {
                self.handle_text(&event, *speaker, text, topic.as_deref()).await;
            }
            EventKind::Audio | EventKind::Video => {
                tracing::debug!(session_id = %event.session_id, "media event ignored (reserved)");
            }
        }
    }

    async fn handle_text(
        &self,
        event: &SessionEvent,
        speaker: Speaker,
        text: &str,
        topic: Option<&str>,
    ) {
        let Some(handle) = self.sessions.get(&event.session_id) else {
            tracing::warn!(session_id = %event.session_id, "text event for unknown session");
            return;
        };

        let (is_user_turn, tutor_text, debounced) = {
            let mut state = handle.lock().await;
            state.context.add_turn(speaker, text, event.timestamp);

            let is_user = speaker == Speaker::User && !text.trim().is_empty();
            let debounced = if is_user {
                let elapsed = state
                    .context
                    .last_retrieval_at
                    .map(|at| (event.timestamp - at).num_milliseconds() as f64 / 1000.0)
                    .unwrap_or(f64::MAX);
                if elapsed >= self.config.pipeline.debounce_seconds {
                    state.context.last_retrieval_at = Some(event.timestamp);
                    true
                } else {
                    false
                }
            } else {
                false
            };
            (is_user, state.context.last_tutor_text.clone(), debounced)
        };

        if let Err(err) = self.session_repo.touch_session(&event.session_id, event.timestamp).await
        {
            tracing::warn!(session_id = %event.session_id, error = %err, "session touch failed");
        }
        if is_user_turn {
            if let Err(err) = self.session_repo.record_turn(&event.session_id).await {
                tracing::warn!(session_id = %event.session_id, error = %err, "turn count update failed");
            }
        }

        if !is_user_turn {
            return;
        }

        if debounced {
            self.spawn_retrieval(
                Arc::clone(&handle),
                event.learner_id.clone(),
                event.session_id.clone(),
                text.to_string(),
                tutor_text.clone().unwrap_or_default(),
                event.timestamp,
            );
        }

        self.spawn_extraction(
            Arc::clone(&handle),
            event.learner_id.clone(),
            event.session_id.clone(),
            text.to_string(),
            tutor_text.unwrap_or_default(),
            topic.unwrap_or("general").to_string(),
        );
    }

    /// Light (and possibly deep) retrieval followed by the reflection layer,
    /// off the event loop.
    fn spawn_retrieval(
        &self,
        session: SessionHandle,
        learner_id: String,
        session_id: String,
        user_text: String,
        tutor_text: String,
        now: DateTime<Utc>,
    ) {
        let stores = Arc::clone(&self.stores);
        let retriever = Arc::clone(&self.retriever);
        let injections = Arc::clone(&self.injections);
        let budget = Arc::clone(&self.io_budget);

        tokio::spawn(async move {
            let _permit = budget.acquire().await;
            let store = match stores.get_or_open(&learner_id).await {
                Ok(store) => store,
                Err(err) => {
                    tracing::error!(learner_id, error = %err, "memory store unavailable for retrieval");
                    return;
                }
            };
            retriever
                .on_user_turn(&store, &session, &user_text, &tutor_text, now)
                .await;
            if let Some(instruction) = retriever.build_injection(&session).await {
                injections.push(&session_id, &instruction);
            }
        });
    }

    /// Exchange buffering and batched extraction, off the event loop.
    fn spawn_extraction(
        &self,
        session: SessionHandle,
        learner_id: String,
        session_id: String,
        user_text: String,
        tutor_text: String,
        topic: String,
    ) {
        let stores = Arc::clone(&self.stores);
        let consolidator = Arc::clone(&self.consolidator);
        let budget = Arc::clone(&self.io_budget);
        let extraction_lock = self
            .sessions
            .extraction_lock(&session_id)
            .unwrap_or_else(|| Arc::new(Mutex::new(())));

        tokio::spawn(async move {
            let _permit = budget.acquire().await;
            let store = match stores.get_or_open(&learner_id).await {
                Ok(store) => store,
                Err(err) => {
                    tracing::error!(learner_id, error = %err, "memory store unavailable for extraction");
                    return;
                }
            };
            if let Err(err) = consolidator
                .update_after_exchange(
                    &store,
                    &session,
                    &extraction_lock,
                    &user_text,
                    &tutor_text,
                    &topic,
                )
                .await
            {
                tracing::error!(session_id, error = %err, "exchange update failed");
            }
        });
    }

    /// Evaluate time-based skills on every resident session and sync dirty
    /// contexts to durable storage. Runs when the event queue is idle so
    /// inactivity checks fire without traffic.
    pub async fn run_idle_pass(&self, now: DateTime<Utc>) {
        for session_id in self.sessions.session_ids() {
            let Some(handle) = self.sessions.get(&session_id) else {
                continue;
            };
            let (injections, dirty_transcript) = {
                let mut state = handle.lock().await;
                let injections = self.skills.execute_all(&mut state.context, now);
                let transcript = state.context.dirty.then(|| {
                    state.context.dirty = false;
                    (
                        state.context.learner_id.clone(),
                        ConversationTranscript {
                            session_id: state.context.session_id.clone(),
                            learner_id: state.context.learner_id.clone(),
                            started_at: state.context.started_at,
                            ended_at: now,
                            turn_count: state.context.turn_count,
                            turns: state.context.turns.clone(),
                        },
                    )
                });
                (injections, transcript)
            };

            for instruction in injections {
                self.injections.push(&session_id, &instruction);
            }

            if let Some((learner_id, transcript)) = dirty_transcript {
                let _permit = self.io_budget.acquire().await;
                if let Err(err) = self.artifacts.save_conversation(&learner_id, &transcript).await
                {
                    tracing::warn!(session_id, error = %err, "dirty context sync failed");
                }
            }
        }
    }
}

fn compose_greeting(opening: Option<&OpeningArtifact>) -> String {
    match opening {
        Some(opening) if !opening.welcome_hook.is_empty() => {
            let mut parts = vec![opening.welcome_hook.clone()];
            if !opening.last_session_summary.is_empty() {
                parts.push(format!(
                    "Last time we worked on: {}",
                    opening.last_session_summary
                ));
            }
            if !opening.unfinished_threads.is_empty() {
                parts.push(format!(
                    "Unfinished topics: {}",
                    opening.unfinished_threads.join(", ")
                ));
            }
            if !opening.personal_relevance.is_empty() {
                parts.push(opening.personal_relevance.clone());
            }
            format!("{}\n{}", GREETING_PREFIX, parts.join(" "))
        }
        _ => format!(
            "{}\nYou are starting a tutoring session.\nPlease greet the student warmly and \
             ask how they're doing today.\nMake them feel welcome and excited to learn.",
            GREETING_PREFIX
        ),
    }
}

fn compose_closing(goodbye: &str, hooks: &[String]) -> String {
    if hooks.is_empty() {
        format!("{}\n{}", GREETING_PREFIX, goodbye)
    } else {
        format!("{}\n{} Next time: {}", GREETING_PREFIX, goodbye, hooks.join(", "))
    }
}

fn fallback_closing(session: &Session, now: DateTime<Utc>) -> String {
    let duration_minutes = (now - session.started_at).num_seconds() as f64 / 60.0;
    format!(
        "{}\nThe tutoring session is ending now.\nSession stats: {:.1} minutes, {} questions \
         attempted.\nPlease give the student a warm closing message, acknowledge their hard \
         work, and encourage them for next session.",
        GREETING_PREFIX, duration_minutes, session.questions_attempted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TutorConfig;
    use crate::domain::{ClosingArtifact, OpeningArtifact};
    use crate::memory::{MemoryExtractor, MemoryStoreRegistry};
    use crate::ports::session_repository::MockSessionRepository;
    use crate::ports::LanguageModel;
    use crate::runtime::skills::{InactivityCheck, SkillSet};
    use crate::testing::{
        InMemoryArtifactStore, InMemoryVectorProvider, ScriptedLanguageModel, StaticEmbedder,
    };

    struct Harness {
        assistant: Arc<TeachingAssistant>,
        artifacts: Arc<InMemoryArtifactStore>,
        llm: Arc<ScriptedLanguageModel>,
    }

    fn harness(mut config: TutorConfig, session_repo: MockSessionRepository) -> Harness {
        config.pipeline.opening_poll_seconds = 0.0;

        let artifacts = Arc::new(InMemoryArtifactStore::new());
        let llm = Arc::new(ScriptedLanguageModel::new());
        let stores = Arc::new(MemoryStoreRegistry::new(
            Arc::new(InMemoryVectorProvider::new()),
            Arc::new(StaticEmbedder::new()),
            Arc::clone(&artifacts) as Arc<dyn ArtifactStore>,
            config.memory.clone(),
        ));
        let retriever = Arc::new(MemoryRetriever::new(
            Arc::clone(&llm) as Arc<dyn LanguageModel>,
            config.pipeline.deep_retrieval_period_seconds,
        ));
        let extractor = Arc::new(MemoryExtractor::new(
            Arc::clone(&llm) as Arc<dyn LanguageModel>
        ));
        let consolidator = Arc::new(Consolidator::new(
            Arc::clone(&llm) as Arc<dyn LanguageModel>,
            extractor,
            Arc::clone(&artifacts) as Arc<dyn ArtifactStore>,
            config.pipeline.extraction_batch_size,
        ));
        let injections = Arc::new(InjectionManager::new(INSTRUCTION_PREFIX));
        let mut skills = SkillSet::new();
        skills.register(Box::new(InactivityCheck::new(
            config.pipeline.inactivity_threshold_seconds,
            config.pipeline.inactivity_grace_seconds,
        )));

        let assistant = Arc::new(TeachingAssistant::new(
            config,
            Arc::new(session_repo),
            Arc::clone(&artifacts) as Arc<dyn ArtifactStore>,
            stores,
            retriever,
            consolidator,
            injections,
            skills,
        ));

        Harness {
            assistant,
            artifacts,
            llm,
        }
    }

    fn permissive_repo() -> MockSessionRepository {
        let mut repo = MockSessionRepository::new();
        repo.expect_create_session().returning(|_| Ok(()));
        repo.expect_touch_session().returning(|_, _| Ok(()));
        repo.expect_record_turn().returning(|_| Ok(()));
        repo.expect_end_session().returning(|_, _| Ok(()));
        repo
    }

    #[tokio::test]
    async fn fresh_learner_gets_the_generic_greeting() {
        let h = harness(TutorConfig::default(), permissive_repo());

        let (session, greeting) = h.assistant.start_session("learner-1").await.unwrap();
        assert!(greeting.starts_with(GREETING_PREFIX));
        assert!(greeting.contains("greet the student warmly"));

        // The greeting is queued for delivery and recorded in the context.
        let queued = h.assistant.injections().pop(&session.id).unwrap();
        assert_eq!(queued.text, greeting);
    }

    #[tokio::test]
    async fn opening_artifact_drives_the_greeting_and_is_cleared() {
        let h = harness(TutorConfig::default(), permissive_repo());
        h.artifacts.set_opening(
            "learner-1",
            OpeningArtifact {
                welcome_hook: "Last time you cracked the discriminant!".to_string(),
                last_session_summary: "quadratics breakthrough".to_string(),
                unfinished_threads: vec!["completing the square".to_string()],
                ..Default::default()
            },
        );

        let (_, greeting) = h.assistant.start_session("learner-1").await.unwrap();
        assert!(greeting.contains("cracked the discriminant"));
        assert!(greeting.contains("Unfinished topics: completing the square"));

        // Consumed: a second start falls back to the generic greeting.
        assert!(!h.artifacts.has_opening("learner-1"));
        let (_, second) = h.assistant.start_session("learner-1").await.unwrap();
        assert!(second.contains("greet the student warmly"));
    }

    #[tokio::test]
    async fn ending_a_session_saves_transcript_and_queues_closing() {
        let mut repo = permissive_repo();
        let stored = Session::new("learner-1".to_string(), Utc::now());
        repo.expect_get_session()
            .returning(move |_| Ok(Some(stored.clone())));

        let h = harness(TutorConfig::default(), repo);
        let (session, _) = h.assistant.start_session("learner-1").await.unwrap();

        // Scripted call order: the first user turn spawns a retrieval task
        // (analysis call), then session end flushes the one buffered exchange
        // (extraction call) and regenerates the closing twice.
        h.llm
            .push_response(r#"{"need_retrieval": false, "retrieval_query": null}"#);
        h.llm.push_response(
            r#"{"memories": [], "emotions": [], "key_moments": [], "unfinished_topics": []}"#,
        );
        h.llm
            .push_response(r#"{"summary": "s", "goodbye": "Bye for now!", "hooks": []}"#);
        h.llm
            .push_response(r#"{"summary": "s", "goodbye": "Bye for now!", "hooks": []}"#);

        let now = Utc::now();
        h.assistant
            .handle_event(SessionEvent::text(
                session.id.clone(),
                "learner-1",
                Speaker::User,
                "what is a discriminant",
                now,
            ))
            .await;
        // Let the background retrieval/extraction tasks settle first.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let closing = h.assistant.end_session(&session.id).await.unwrap();
        assert!(closing.contains("Bye for now!"));

        let transcript = h.artifacts.conversation(&session.id).unwrap();
        assert!(transcript
            .turns
            .iter()
            .any(|t| t.text.contains("what is a discriminant")));

        // In-memory state is gone.
        assert!(h.assistant.session_registry().get(&session.id).is_none());
    }

    #[tokio::test]
    async fn ending_an_unknown_session_is_an_error() {
        let mut repo = permissive_repo();
        repo.expect_get_session().returning(|_| Ok(None));
        let h = harness(TutorConfig::default(), repo);

        let err = h.assistant.end_session("ghost").await.unwrap_err();
        assert!(err.to_string().contains("Session not found"));
    }

    #[tokio::test]
    async fn idle_pass_emits_inactivity_instruction_once() {
        let mut config = TutorConfig::default();
        config.pipeline.inactivity_threshold_seconds = 0.0;
        config.pipeline.inactivity_grace_seconds = 0.0;
        let h = harness(config, permissive_repo());

        let (session, _) = h.assistant.start_session("learner-1").await.unwrap();
        // Drain the greeting.
        h.assistant.injections().pop(&session.id);

        let later = Utc::now() + chrono::Duration::seconds(5);
        h.assistant.run_idle_pass(later).await;
        let instruction = h.assistant.injections().pop(&session.id).unwrap();
        assert!(instruction.text.contains("still there"));

        // Flagged: a second pass stays quiet.
        h.assistant.run_idle_pass(later).await;
        assert!(h.assistant.injections().pop(&session.id).is_none());
    }

    #[tokio::test]
    async fn closing_artifact_with_goodbye_shapes_the_closing_prompt() {
        let closing = ClosingArtifact {
            goodbye_message: "Rest up, great work!".to_string(),
            next_session_hooks: vec!["vertex form".to_string()],
            ..Default::default()
        };
        let prompt = compose_closing(&closing.goodbye_message, &closing.next_session_hooks);
        assert!(prompt.contains("Rest up, great work!"));
        assert!(prompt.contains("Next time: vertex form"));
    }
}
