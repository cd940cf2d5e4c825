//! Reusable fixtures and in-memory fakes for tests: a sample curriculum
//! slice, a deterministic embedder, an in-memory vector index, a scripted
//! language model, and an in-memory artifact store.

mod fakes;
mod fixtures;

pub use fakes::{
    InMemoryArtifactStore, InMemoryVectorIndex, InMemoryVectorProvider, ScriptedLanguageModel,
    StaticEmbedder,
};
pub use fixtures::{sample_curriculum, sample_questions};
