//! Composition root: wires configuration, storage, providers, services, and
//! the session runtime into one `AppState` owned by the process entry point.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tutor_core::{
    ArtifactStore, Consolidator, EmbeddingProvider, EventPipeline, EventQueue, GeminiClient,
    GeminiEmbedder, InactivityCheck, InjectionManager, LanguageModel, LearnerStateRepository,
    LearningService, MemoryExtractor, MemoryRetriever, MemoryStoreRegistry, Question,
    QuestionIndex, ResilientLlm, SchedulerService, ServerlessIndexProvider, SessionRepository,
    SkillGraph, SkillRecord, SkillSet, TeachingAssistant, TutorConfig, VectorIndexProvider,
};
use tutor_storage::{init_tutor_db, JsonArtifactStore, SqliteLearnerRepository, SqliteSessionRepository};

/// External collaborators, injectable so tests and embedded hosts can swap
/// the network clients for fakes.
pub struct Providers {
    pub llm: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vector_provider: Arc<dyn VectorIndexProvider>,
}

impl Providers {
    /// Production providers from configuration. The LLM is wrapped in
    /// retry + circuit breaking here so every consumer shares one breaker.
    pub fn from_config(config: &TutorConfig) -> Self {
        let raw_llm: Arc<dyn LanguageModel> = Arc::new(GeminiClient::new(&config.providers));
        let llm: Arc<dyn LanguageModel> =
            Arc::new(ResilientLlm::new(raw_llm, &config.resilience));
        Self {
            llm,
            embedder: Arc::new(GeminiEmbedder::new(&config.providers)),
            vector_provider: Arc::new(ServerlessIndexProvider::new(&config.providers)),
        }
    }
}

pub struct AppState {
    pub config: TutorConfig,
    pub graph: Arc<SkillGraph>,
    pub questions: Arc<QuestionIndex>,
    pub learner_repo: Arc<dyn LearnerStateRepository>,
    pub session_repo: Arc<dyn SessionRepository>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub learning_service: Arc<LearningService>,
    pub scheduler_service: Arc<SchedulerService>,
    pub assistant: Arc<TeachingAssistant>,
    pub pipeline: Arc<EventPipeline>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Build the full application. Fatal misconfiguration (bad curriculum,
    /// unreachable database) fails here, before anything serves.
    pub async fn build(config: TutorConfig, providers: Providers) -> Result<Self> {
        config.validate();

        let (graph, questions) = load_curriculum(&config).await?;
        let graph = Arc::new(graph);
        let questions = Arc::new(questions);
        tracing::info!(
            skills = graph.len(),
            questions = questions.len(),
            "curriculum loaded"
        );

        if !config.paths.db_path.contains(":memory:") {
            let raw_path = config.paths.db_path.trim_start_matches("sqlite://");
            if let Some(parent) = std::path::Path::new(raw_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.ok();
                }
            }
        }
        let pool = init_tutor_db(&config.paths.db_path).await?;
        let learner_repo: Arc<dyn LearnerStateRepository> =
            Arc::new(SqliteLearnerRepository::new(pool.clone()));
        let session_repo: Arc<dyn SessionRepository> =
            Arc::new(SqliteSessionRepository::new(pool));
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(JsonArtifactStore::new(config.paths.data_dir.clone()));

        let learning_service = Arc::new(LearningService::new(
            Arc::clone(&graph),
            Arc::clone(&questions),
            Arc::clone(&learner_repo),
            config.dash.clone(),
        ));
        let scheduler_service = Arc::new(SchedulerService::new(
            Arc::clone(&graph),
            Arc::clone(&questions),
            Arc::clone(&learner_repo),
            config.dash.clone(),
        ));

        let stores = Arc::new(MemoryStoreRegistry::new(
            providers.vector_provider,
            providers.embedder,
            Arc::clone(&artifacts),
            config.memory.clone(),
        ));
        let retriever = Arc::new(MemoryRetriever::new(
            Arc::clone(&providers.llm),
            config.pipeline.deep_retrieval_period_seconds,
        ));
        let extractor = Arc::new(MemoryExtractor::new(Arc::clone(&providers.llm)));
        let consolidator = Arc::new(Consolidator::new(
            Arc::clone(&providers.llm),
            extractor,
            Arc::clone(&artifacts),
            config.pipeline.extraction_batch_size,
        ));
        let injections = Arc::new(InjectionManager::new(
            tutor_core::runtime::assistant::INSTRUCTION_PREFIX,
        ));

        let mut skills = SkillSet::new();
        skills.register(Box::new(InactivityCheck::new(
            config.pipeline.inactivity_threshold_seconds,
            config.pipeline.inactivity_grace_seconds,
        )));

        let assistant = Arc::new(TeachingAssistant::new(
            config.clone(),
            Arc::clone(&session_repo),
            Arc::clone(&artifacts),
            stores,
            retriever,
            consolidator,
            injections,
            skills,
        ));

        let queue = Arc::new(EventQueue::new(1000));
        let pipeline = Arc::new(EventPipeline::new(
            Arc::clone(&assistant),
            queue,
            config.pipeline.batch_size,
        ));

        Ok(Self {
            config,
            graph,
            questions,
            learner_repo,
            session_repo,
            artifacts,
            learning_service,
            scheduler_service,
            assistant,
            pipeline,
        })
    }

    /// Spawn the event pipeline onto the runtime. Returns the join handle;
    /// call `pipeline.shutdown()` to stop it.
    pub fn spawn_pipeline(&self) -> tokio::task::JoinHandle<()> {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move { pipeline.run().await })
    }
}

/// Load skills and questions from the configured JSON files. Skills are a
/// map of id -> record (order inferred from file position when absent);
/// questions are a flat list.
async fn load_curriculum(config: &TutorConfig) -> Result<(SkillGraph, QuestionIndex)> {
    let skills_raw = tokio::fs::read_to_string(&config.paths.skills_file)
        .await
        .with_context(|| format!("cannot read skills file {:?}", config.paths.skills_file))?;
    // serde_json maps preserve insertion order only with a Vec; parse as a
    // list of records to keep within-grade order deterministic.
    let records: Vec<SkillRecord> = match serde_json::from_str(&skills_raw) {
        Ok(records) => records,
        Err(_) => {
            // Alternate accepted shape: {"skill_id": {record}, ...}
            let map: HashMap<String, SkillRecord> =
                serde_json::from_str(&skills_raw).context("skills file is not a record list or map")?;
            let mut records: Vec<SkillRecord> = map.into_values().collect();
            records.sort_by(|a, b| (a.grade_level, a.order, a.id.clone()).cmp(&(
                b.grade_level,
                b.order,
                b.id.clone(),
            )));
            records
        }
    };
    let graph = SkillGraph::load(records).context("skill graph failed validation")?;

    let questions_raw = tokio::fs::read_to_string(&config.paths.questions_file)
        .await
        .with_context(|| format!("cannot read questions file {:?}", config.paths.questions_file))?;
    let questions: Vec<Question> =
        serde_json::from_str(&questions_raw).context("questions file is malformed")?;
    let index = QuestionIndex::load(questions);

    Ok((graph, index))
}
