use crate::config::MemoryConfig;
use crate::domain::ClosingArtifact;
use crate::memory::consolidator::Consolidator;
use crate::memory::extractor::MemoryExtractor;
use crate::memory::store::MemoryStore;
use crate::ports::{ArtifactStore, LanguageModel};
use crate::runtime::sessions::{SessionHandle, SessionRegistry};
use crate::testing::{InMemoryArtifactStore, InMemoryVectorProvider, ScriptedLanguageModel, StaticEmbedder};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

const LEARNER: &str = "learner-1";
const SESSION: &str = "session-1";

const EXTRACTION_JSON: &str = r#"{
  "memories": [
    {"type": "academic", "text": "Struggles with completing the square", "importance": 0.8,
     "metadata": {"topic": "quadratics"}}
  ],
  "emotions": ["frustrated", "excited"],
  "key_moments": ["breakthrough on discriminant"],
  "unfinished_topics": ["completing the square"]
}"#;

const CLOSING_JSON: &str = r#"{
  "summary": "Worked through quadratics and had a breakthrough on the discriminant.",
  "goodbye": "Great push today - rest up!",
  "hooks": ["Revisit the discriminant", "Graph a parabola together"]
}"#;

struct Harness {
    consolidator: Arc<Consolidator>,
    store: Arc<MemoryStore>,
    llm: Arc<ScriptedLanguageModel>,
    artifacts: Arc<InMemoryArtifactStore>,
    session: SessionHandle,
    extraction_lock: Arc<Mutex<()>>,
    _registry: SessionRegistry,
}

async fn harness() -> Harness {
    let provider = Arc::new(InMemoryVectorProvider::new());
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let store = Arc::new(
        MemoryStore::open(
            LEARNER,
            provider.as_ref(),
            Arc::new(StaticEmbedder::new()),
            Arc::clone(&artifacts) as Arc<dyn ArtifactStore>,
            MemoryConfig::default(),
        )
        .await
        .unwrap(),
    );

    let llm = Arc::new(ScriptedLanguageModel::new());
    let extractor = Arc::new(MemoryExtractor::new(
        Arc::clone(&llm) as Arc<dyn LanguageModel>
    ));
    let consolidator = Arc::new(Consolidator::new(
        Arc::clone(&llm) as Arc<dyn LanguageModel>,
        extractor,
        Arc::clone(&artifacts) as Arc<dyn ArtifactStore>,
        3,
    ));

    let registry = SessionRegistry::new(50, 50, 100);
    let session = registry.create(SESSION, LEARNER, Utc::now());
    let extraction_lock = registry.extraction_lock(SESSION).unwrap();

    Harness {
        consolidator,
        store,
        llm,
        artifacts,
        session,
        extraction_lock,
        _registry: registry,
    }
}

async fn push_exchange(h: &Harness, learner_text: &str, tutor_text: &str) {
    h.consolidator
        .update_after_exchange(
            &h.store,
            &h.session,
            &h.extraction_lock,
            learner_text,
            tutor_text,
            "quadratics",
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn exchanges_buffer_until_the_batch_threshold() {
    let h = harness().await;

    push_exchange(&h, "what is the discriminant", "it tells you about the roots").await;
    push_exchange(&h, "so negative means no real roots", "exactly right").await;

    assert_eq!(h.llm.calls(), 0, "no extraction before the threshold");
    let state = h.session.lock().await;
    assert_eq!(state.closing.exchange_buffer.len(), 2);
    assert_eq!(state.closing.topics_covered, vec!["quadratics"]);
}

#[tokio::test]
async fn third_exchange_triggers_extraction_and_closing_regeneration() {
    let h = harness().await;
    h.llm.push_response(EXTRACTION_JSON);
    h.llm.push_response(CLOSING_JSON);

    push_exchange(&h, "what is the discriminant", "it tells you about the roots").await;
    push_exchange(&h, "so negative means no real roots", "exactly right").await;
    push_exchange(&h, "can we try completing the square", "let's do it next time").await;

    assert_eq!(h.llm.calls(), 2, "one extraction call + one closing call");

    let state = h.session.lock().await;
    assert!(state.closing.exchange_buffer.is_empty(), "buffer cleared after batch");
    assert_eq!(state.closing.emotional_arc, vec!["frustrated", "excited"]);
    assert_eq!(state.closing.key_moments, vec!["breakthrough on discriminant"]);
    assert_eq!(state.closing.unfinished_topics, vec!["completing the square"]);
    assert_eq!(state.closing.new_memories.len(), 1);
    assert!(state
        .closing
        .session_summary
        .contains("breakthrough on the discriminant"));
    assert_eq!(state.closing.goodbye_message, "Great push today - rest up!");

    // Unfinished topics lead the hooks; generated hooks fill to three.
    assert_eq!(
        state.closing.next_session_hooks,
        vec![
            "completing the square",
            "Revisit the discriminant",
            "Graph a parabola together"
        ]
    );
}

#[tokio::test]
async fn closing_artifact_is_persisted_after_each_batch() {
    let h = harness().await;
    h.llm.push_response(EXTRACTION_JSON);
    h.llm.push_response(CLOSING_JSON);

    push_exchange(&h, "one", "reply one word padding").await;
    push_exchange(&h, "two", "reply two word padding").await;
    push_exchange(&h, "three", "reply three word padding").await;

    let saved = h.artifacts.closing_for(LEARNER).expect("closing artifact saved");
    assert_eq!(saved.session_id, SESSION);
    assert!(!saved.session_summary.is_empty());
    assert_eq!(saved.unfinished_topics, vec!["completing the square"]);
}

#[tokio::test]
async fn extraction_failure_still_clears_the_buffer() {
    let h = harness().await;
    h.llm.push_error("extraction upstream down");
    h.llm.push_error("closing upstream down");

    push_exchange(&h, "one question here", "one answer here").await;
    push_exchange(&h, "two question here", "two answer here").await;
    push_exchange(&h, "three question here", "three answer here").await;

    let state = h.session.lock().await;
    assert!(state.closing.exchange_buffer.is_empty(), "buffer never leaks on error");
    assert!(state.closing.new_memories.is_empty());
}

#[tokio::test]
async fn one_sided_exchanges_are_not_buffered() {
    let h = harness().await;
    h.consolidator
        .update_after_exchange(&h.store, &h.session, &h.extraction_lock, "hello", "", "general")
        .await
        .unwrap();

    let state = h.session.lock().await;
    assert!(state.closing.exchange_buffer.is_empty());
}

#[tokio::test]
async fn consolidation_flushes_the_remaining_buffer() {
    let h = harness().await;
    // Flush path: extraction for the 2 buffered exchanges, then two closing
    // regenerations (one inside the batch, one final).
    h.llm.push_response(EXTRACTION_JSON);
    h.llm.push_response(CLOSING_JSON);
    h.llm.push_response(CLOSING_JSON);

    push_exchange(&h, "what is the discriminant", "it tells you about the roots").await;
    push_exchange(&h, "so negative means none", "right").await;

    let artifact = h
        .consolidator
        .consolidate_session(&h.store, &h.session, &h.extraction_lock)
        .await
        .unwrap();

    assert_eq!(artifact.session_id, SESSION);
    assert_eq!(artifact.unfinished_topics, vec!["completing the square"]);
    assert_eq!(artifact.key_moments, vec!["breakthrough on discriminant"]);
    assert_eq!(artifact.new_memories.len(), 1);

    let state = h.session.lock().await;
    assert!(state.closing.exchange_buffer.is_empty());
}

#[tokio::test]
async fn opening_artifact_references_the_breakthrough() {
    let h = harness().await;

    let closing = ClosingArtifact {
        session_id: SESSION.to_string(),
        session_summary: "Had a breakthrough on the discriminant.".to_string(),
        key_moments: vec!["breakthrough on discriminant".to_string()],
        unfinished_topics: vec![
            "completing the square".to_string(),
            "vertex form".to_string(),
        ],
        emotional_arc: vec!["frustrated".to_string(), "excited".to_string()],
        ..Default::default()
    };

    // No personal memories stored, so only welcome hook + opener are called.
    h.llm
        .push_response("Last time you cracked the discriminant - ready to build on that?");
    h.llm
        .push_response("Welcome back! Shall we pick up completing the square?");

    Arc::clone(&h.consolidator)
        .generate_and_save_opening(Arc::clone(&h.store), LEARNER.to_string(), closing)
        .await;

    let opening = h
        .artifacts
        .load_opening(LEARNER)
        .await
        .unwrap()
        .expect("opening artifact saved");
    assert!(opening.welcome_hook.contains("cracked the discriminant"));
    assert_eq!(opening.last_session_summary, "Had a breakthrough on the discriminant.");
    assert_eq!(opening.unfinished_threads, vec!["completing the square", "vertex form"]);
    assert_eq!(opening.emotional_state_last, "excited");
    assert!(!opening.suggested_opener.is_empty());
}

#[tokio::test]
async fn opening_generation_survives_llm_failures() {
    let h = harness().await;
    let closing = ClosingArtifact {
        session_id: SESSION.to_string(),
        session_summary: "Short session.".to_string(),
        ..Default::default()
    };

    h.llm.push_error("welcome hook generation down");
    h.llm.push_error("opener generation down");

    Arc::clone(&h.consolidator)
        .generate_and_save_opening(Arc::clone(&h.store), LEARNER.to_string(), closing)
        .await;

    let opening = h.artifacts.load_opening(LEARNER).await.unwrap().unwrap();
    assert!(opening.welcome_hook.is_empty());
    assert_eq!(opening.last_session_summary, "Short session.");
    assert_eq!(opening.emotional_state_last, "neutral");
}
