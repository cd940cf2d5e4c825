pub mod artifact_store;
pub mod embeddings;
pub mod language_model;
pub mod learner_repository;
pub mod session_repository;
pub mod vector_index;

pub use artifact_store::ArtifactStore;
pub use embeddings::EmbeddingProvider;
pub use language_model::LanguageModel;
pub use learner_repository::LearnerStateRepository;
pub use session_repository::SessionRepository;
pub use vector_index::{VectorIndex, VectorIndexProvider, VectorMatch, VectorQuery, VectorRecord};
