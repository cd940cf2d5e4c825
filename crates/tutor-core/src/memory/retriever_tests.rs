use crate::config::MemoryConfig;
use crate::domain::{MemoryCategory, MemoryRecord, Speaker};
use crate::memory::retriever::MemoryRetriever;
use crate::memory::store::MemoryStore;
use crate::ports::{ArtifactStore, LanguageModel};
use crate::runtime::sessions::{SessionHandle, SessionRegistry};
use crate::testing::{InMemoryArtifactStore, InMemoryVectorProvider, ScriptedLanguageModel, StaticEmbedder};
use chrono::{Duration, Utc};
use std::sync::Arc;

const LEARNER: &str = "learner-1";
const SESSION: &str = "session-current";

struct Harness {
    store: MemoryStore,
    llm: Arc<ScriptedLanguageModel>,
    retriever: MemoryRetriever,
    session: SessionHandle,
    _registry: SessionRegistry,
}

async fn harness() -> Harness {
    let provider = Arc::new(InMemoryVectorProvider::new());
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let store = MemoryStore::open(
        LEARNER,
        provider.as_ref(),
        Arc::new(StaticEmbedder::new()),
        artifacts as Arc<dyn ArtifactStore>,
        MemoryConfig::default(),
    )
    .await
    .unwrap();

    let llm = Arc::new(ScriptedLanguageModel::new());
    let retriever = MemoryRetriever::new(Arc::clone(&llm) as Arc<dyn LanguageModel>, 180.0);

    let registry = SessionRegistry::new(50, 50, 100);
    let session = registry.create(SESSION, LEARNER, Utc::now());
    {
        let mut state = session.lock().await;
        state
            .context
            .add_turn(Speaker::User, "can we review fractions", Utc::now());
        state
            .context
            .add_turn(Speaker::Tutor, "sure, where did we leave off", Utc::now());
    }

    Harness {
        store,
        llm,
        retriever,
        session,
        _registry: registry,
    }
}

/// Seed a memory written by a *previous* session so current-session
/// exclusion does not hide it.
async fn seed_memory(store: &MemoryStore, text: &str) -> String {
    let memory = MemoryRecord::new(
        MemoryCategory::Academic,
        text.to_string(),
        0.7,
        LEARNER.to_string(),
        "session-previous".to_string(),
    );
    store.save(memory).await.unwrap();
    let hits = store.search(text, None, 1, None).await.unwrap();
    hits[0].memory.id.clone()
}

#[tokio::test]
async fn light_retrieval_uses_the_optimized_query() {
    let h = harness().await;
    seed_memory(&h.store, "previously struggled with fraction addition").await;

    h.llm.push_response(
        r#"{"need_retrieval": true, "retrieval_query": "previously struggled with fraction addition", "reasoning": "topic continuity"}"#,
    );

    h.retriever
        .on_user_turn(&h.store, &h.session, "fractions are hard", "sure", Utc::now())
        .await;

    let state = h.session.lock().await;
    assert_eq!(state.caches.light.len(), 1);
    assert_eq!(
        state.caches.light[0].memory.text,
        "previously struggled with fraction addition"
    );
}

#[tokio::test]
async fn analysis_can_skip_retrieval_entirely() {
    let h = harness().await;
    seed_memory(&h.store, "previously struggled with fraction addition").await;

    h.llm.push_response(r#"{"need_retrieval": false, "retrieval_query": null}"#);

    h.retriever
        .on_user_turn(&h.store, &h.session, "ok thanks", "great job", Utc::now())
        .await;

    let state = h.session.lock().await;
    assert!(state.caches.light.is_empty());
    assert_eq!(h.llm.calls(), 1, "only the analysis call should run");
}

#[tokio::test]
async fn analysis_failure_falls_back_to_the_raw_user_text() {
    let h = harness().await;
    seed_memory(&h.store, "tell me about derivatives").await;

    h.llm.push_error("llm unavailable");

    h.retriever
        .on_user_turn(&h.store, &h.session, "tell me about derivatives", "", Utc::now())
        .await;

    // Fallback searched with the raw text and found the seeded memory.
    let state = h.session.lock().await;
    assert_eq!(state.caches.light.len(), 1);
}

#[tokio::test]
async fn deep_retrieval_runs_after_the_period_elapses() {
    let h = harness().await;
    seed_memory(&h.store, "can we review fractions sure").await;

    {
        let mut state = h.session.lock().await;
        state.caches.last_deep_at = Some(Utc::now() - Duration::seconds(200));
    }

    h.llm
        .push_response(r#"{"need_retrieval": false, "retrieval_query": null}"#);
    h.llm
        .push_response(r#"{"deep_query": "can we review fractions sure"}"#);

    h.retriever
        .on_user_turn(&h.store, &h.session, "keep going", "", Utc::now())
        .await;

    let state = h.session.lock().await;
    let academic = state.caches.deep.get(&MemoryCategory::Academic).unwrap();
    assert_eq!(academic.len(), 1);
    // The deep timer was reset.
    let elapsed = Utc::now() - state.caches.last_deep_at.unwrap();
    assert!(elapsed.num_seconds() < 10);
}

#[tokio::test]
async fn first_turn_arms_the_deep_timer_without_running() {
    let h = harness().await;
    h.llm
        .push_response(r#"{"need_retrieval": false, "retrieval_query": null}"#);

    h.retriever
        .on_user_turn(&h.store, &h.session, "hello", "", Utc::now())
        .await;

    let state = h.session.lock().await;
    assert!(state.caches.last_deep_at.is_some());
    assert!(state.caches.deep.is_empty());
}

#[tokio::test]
async fn injection_produces_an_instruction_and_clears_caches() {
    let h = harness().await;
    let memory_id = seed_memory(&h.store, "previously struggled with fraction addition").await;

    h.llm.push_response(
        r#"{"need_retrieval": true, "retrieval_query": "fraction addition history"}"#,
    );
    h.retriever
        .on_user_turn(&h.store, &h.session, "fractions again", "", Utc::now())
        .await;

    h.llm
        .push_response("Gently revisit fraction addition before moving on.");
    let injection = h.retriever.build_injection(&h.session).await.unwrap();
    assert!(injection.contains("Gently revisit fraction addition"));
    assert!(injection.contains("without explicitly mentioning these memories"));

    let state = h.session.lock().await;
    assert!(state.caches.is_empty(), "caches clear at injection time");
    assert!(state.injected.contains(&memory_id));
}

#[tokio::test]
async fn already_injected_memories_never_reach_the_reflector_again() {
    let h = harness().await;
    seed_memory(&h.store, "previously struggled with fraction addition").await;

    // First round injects the memory.
    h.llm.push_response(
        r#"{"need_retrieval": true, "retrieval_query": "fraction addition history"}"#,
    );
    h.retriever
        .on_user_turn(&h.store, &h.session, "fractions", "", Utc::now())
        .await;
    h.llm.push_response("Revisit fraction addition.");
    assert!(h.retriever.build_injection(&h.session).await.is_some());

    // A later (deep) retrieval surfaces the same memory again.
    h.llm.push_response(
        r#"{"need_retrieval": true, "retrieval_query": "fraction addition history"}"#,
    );
    h.retriever
        .on_user_turn(&h.store, &h.session, "more fractions", "", Utc::now())
        .await;

    let calls_before = h.llm.calls();
    let injection = h.retriever.build_injection(&h.session).await;
    assert!(injection.is_none(), "filtered candidate set suppresses injection");
    assert_eq!(h.llm.calls(), calls_before, "no reflection call for an empty set");
}

#[tokio::test]
async fn reflector_none_sentinel_suppresses_injection() {
    let h = harness().await;
    seed_memory(&h.store, "previously struggled with fraction addition").await;

    h.llm.push_response(
        r#"{"need_retrieval": true, "retrieval_query": "fraction addition history"}"#,
    );
    h.retriever
        .on_user_turn(&h.store, &h.session, "fractions", "", Utc::now())
        .await;

    h.llm.push_response("NONE");
    let injection = h.retriever.build_injection(&h.session).await;
    assert!(injection.is_none());
}

#[tokio::test]
async fn empty_caches_mean_no_injection_and_no_llm_call() {
    let h = harness().await;
    let injection = h.retriever.build_injection(&h.session).await;
    assert!(injection.is_none());
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn empty_user_text_skips_analysis_and_search() {
    let h = harness().await;
    h.retriever
        .on_user_turn(&h.store, &h.session, "   ", "prior", Utc::now())
        .await;
    assert_eq!(h.llm.calls(), 0);
    let state = h.session.lock().await;
    assert!(state.caches.light.is_empty());
}
