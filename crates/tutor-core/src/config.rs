//! Centralized configuration. Every section has compiled-in defaults and can
//! be overridden through `TUTOR_*` environment variables.

use std::collections::HashSet;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Cosine similarity at or above which a new memory merges into an
    /// existing one instead of creating a new vector.
    pub similarity_threshold: f64,
    pub min_word_count: usize,
    pub junk_words: HashSet<String>,
    pub weight_similarity: f64,
    pub weight_recency: f64,
    pub weight_importance: f64,
    pub recency_decay_hours: f64,
    pub max_counter_for_frequency: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        let junk_words = ["y", "yes", "no", "okay", "ok", "yeah", "nope", "yep", "sure", "fine", "k"]
            .iter()
            .map(|w| w.to_string())
            .collect();
        Self {
            similarity_threshold: 0.92,
            min_word_count: 3,
            junk_words,
            weight_similarity: 0.6,
            weight_recency: 0.3,
            weight_importance: 0.1,
            recency_decay_hours: 24.0,
            max_counter_for_frequency: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DashConfig {
    /// Predicted-correctness threshold separating "needs practice" from
    /// "mastered" and gating prerequisites.
    pub probability_threshold: f64,
    /// How many recent attempts feed the adaptive-difficulty analysis.
    pub lookback_count: usize,
    /// Responses slower than this get a halved strength increment.
    pub time_penalty_seconds: f64,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            probability_threshold: 0.7,
            lookback_count: 5,
            time_penalty_seconds: 180.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub debounce_seconds: f64,
    pub deep_retrieval_period_seconds: f64,
    pub max_history_per_session: usize,
    pub max_sessions: usize,
    pub max_injected_ids: usize,
    /// Exchanges buffered before one batched extraction call.
    pub extraction_batch_size: usize,
    pub inactivity_threshold_seconds: f64,
    pub inactivity_grace_seconds: f64,
    /// Permits for blocking file I/O offloaded from the event loop.
    pub io_workers: usize,
    /// How long session start waits for an opening artifact still being
    /// generated by the previous session's background task.
    pub opening_poll_seconds: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            debounce_seconds: 5.0,
            deep_retrieval_period_seconds: 180.0,
            max_history_per_session: 50,
            max_sessions: 50,
            max_injected_ids: 100,
            extraction_batch_size: 3,
            inactivity_threshold_seconds: 60.0,
            inactivity_grace_seconds: 60.0,
            io_workers: 4,
            opening_poll_seconds: 3.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub llm_failure_threshold: u32,
    pub llm_recovery_timeout_seconds: f64,
    pub retry_attempts: u32,
    pub retry_delay_seconds: f64,
    pub retry_backoff: f64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            llm_failure_threshold: 5,
            llm_recovery_timeout_seconds: 60.0,
            retry_attempts: 3,
            retry_delay_seconds: 1.0,
            retry_backoff: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Base directory for per-learner artifacts and transcripts.
    pub data_dir: PathBuf,
    /// SQLite database path (`:memory:` supported).
    pub db_path: String,
    pub skills_file: PathBuf,
    pub questions_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            db_path: "data/tutor.db".to_string(),
            skills_file: PathBuf::from("data/skills.json"),
            questions_file: PathBuf::from("data/questions.json"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_base_url: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub vector_api_key: String,
    pub vector_base_url: String,
    pub vector_cloud: String,
    pub vector_region: String,
    /// How long to poll a newly created index for readiness.
    pub index_ready_timeout_seconds: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_model: "gemini-2.0-flash-lite".to_string(),
            llm_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            embedding_dimension: 1024,
            vector_api_key: String::new(),
            vector_base_url: "https://api.pinecone.io".to_string(),
            vector_cloud: "aws".to_string(),
            vector_region: "us-east-1".to_string(),
            index_ready_timeout_seconds: 300.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TutorConfig {
    pub memory: MemoryConfig,
    pub dash: DashConfig,
    pub pipeline: PipelineConfig,
    pub resilience: ResilienceConfig,
    pub paths: PathsConfig,
    pub providers: ProviderConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, raw, "ignoring unparseable environment override"),
        }
    }
}

fn env_string(key: &str, target: &mut String) {
    if let Ok(raw) = std::env::var(key) {
        *target = raw;
    }
}

impl TutorConfig {
    /// Load defaults then apply `TUTOR_*` environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        env_parse("TUTOR_MEMORY_SIMILARITY_THRESHOLD", &mut config.memory.similarity_threshold);
        env_parse("TUTOR_MEMORY_MIN_WORD_COUNT", &mut config.memory.min_word_count);
        if let Ok(raw) = std::env::var("TUTOR_MEMORY_JUNK_WORDS") {
            config.memory.junk_words = raw
                .split(',')
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect();
        }
        env_parse("TUTOR_MEMORY_WEIGHT_SIMILARITY", &mut config.memory.weight_similarity);
        env_parse("TUTOR_MEMORY_WEIGHT_RECENCY", &mut config.memory.weight_recency);
        env_parse("TUTOR_MEMORY_WEIGHT_IMPORTANCE", &mut config.memory.weight_importance);
        env_parse("TUTOR_MEMORY_RECENCY_DECAY_HOURS", &mut config.memory.recency_decay_hours);
        env_parse(
            "TUTOR_MEMORY_MAX_COUNTER_FREQUENCY",
            &mut config.memory.max_counter_for_frequency,
        );

        env_parse("TUTOR_DASH_PROBABILITY_THRESHOLD", &mut config.dash.probability_threshold);
        env_parse("TUTOR_DASH_LOOKBACK_COUNT", &mut config.dash.lookback_count);
        env_parse("TUTOR_DASH_TIME_PENALTY_SECONDS", &mut config.dash.time_penalty_seconds);

        env_parse("TUTOR_PIPELINE_BATCH_SIZE", &mut config.pipeline.batch_size);
        env_parse("TUTOR_PIPELINE_DEBOUNCE_SECONDS", &mut config.pipeline.debounce_seconds);
        env_parse(
            "TUTOR_PIPELINE_DEEP_RETRIEVAL_PERIOD_SECONDS",
            &mut config.pipeline.deep_retrieval_period_seconds,
        );
        env_parse("TUTOR_PIPELINE_MAX_HISTORY", &mut config.pipeline.max_history_per_session);
        env_parse("TUTOR_PIPELINE_MAX_SESSIONS", &mut config.pipeline.max_sessions);
        env_parse("TUTOR_PIPELINE_MAX_INJECTED_IDS", &mut config.pipeline.max_injected_ids);
        env_parse("TUTOR_PIPELINE_IO_WORKERS", &mut config.pipeline.io_workers);

        env_parse(
            "TUTOR_RESILIENCE_LLM_FAILURE_THRESHOLD",
            &mut config.resilience.llm_failure_threshold,
        );
        env_parse(
            "TUTOR_RESILIENCE_LLM_RECOVERY_TIMEOUT_SECONDS",
            &mut config.resilience.llm_recovery_timeout_seconds,
        );
        env_parse("TUTOR_RESILIENCE_RETRY_ATTEMPTS", &mut config.resilience.retry_attempts);
        env_parse("TUTOR_RESILIENCE_RETRY_DELAY_SECONDS", &mut config.resilience.retry_delay_seconds);
        env_parse("TUTOR_RESILIENCE_RETRY_BACKOFF", &mut config.resilience.retry_backoff);

        if let Ok(raw) = std::env::var("TUTOR_DATA_DIR") {
            config.paths.data_dir = PathBuf::from(&raw);
        }
        env_string("TUTOR_DB_PATH", &mut config.paths.db_path);
        if let Ok(raw) = std::env::var("TUTOR_SKILLS_FILE") {
            config.paths.skills_file = PathBuf::from(&raw);
        }
        if let Ok(raw) = std::env::var("TUTOR_QUESTIONS_FILE") {
            config.paths.questions_file = PathBuf::from(&raw);
        }

        env_string("TUTOR_LLM_API_KEY", &mut config.providers.llm_api_key);
        env_string("TUTOR_LLM_MODEL", &mut config.providers.llm_model);
        env_string("TUTOR_LLM_BASE_URL", &mut config.providers.llm_base_url);
        env_string("TUTOR_EMBEDDING_MODEL", &mut config.providers.embedding_model);
        env_parse("TUTOR_EMBEDDING_DIMENSION", &mut config.providers.embedding_dimension);
        env_string("TUTOR_VECTOR_API_KEY", &mut config.providers.vector_api_key);
        env_string("TUTOR_VECTOR_BASE_URL", &mut config.providers.vector_base_url);
        env_string("TUTOR_VECTOR_CLOUD", &mut config.providers.vector_cloud);
        env_string("TUTOR_VECTOR_REGION", &mut config.providers.vector_region);
        env_parse(
            "TUTOR_INDEX_READY_TIMEOUT_SECONDS",
            &mut config.providers.index_ready_timeout_seconds,
        );

        config.validate();
        config
    }

    /// Sanity-check derived constraints. Non-fatal issues are logged at warn.
    pub fn validate(&self) {
        let total = self.memory.weight_similarity
            + self.memory.weight_recency
            + self.memory.weight_importance;
        if !(0.99..=1.01).contains(&total) {
            warn!(
                similarity = self.memory.weight_similarity,
                recency = self.memory.weight_recency,
                importance = self.memory.weight_importance,
                total,
                "memory scoring weights do not sum to 1.0; scores will be skewed"
            );
        }
    }
}
