pub mod consolidator;
pub mod extractor;
pub mod prompts;
pub mod retriever;
pub mod store;

#[cfg(test)]
mod consolidator_tests;
#[cfg(test)]
mod retriever_tests;

pub use consolidator::{ClosingState, Consolidator};
pub use extractor::MemoryExtractor;
pub use retriever::MemoryRetriever;
pub use store::{sanitize_index_name, MemoryStore, MemoryStoreRegistry};
