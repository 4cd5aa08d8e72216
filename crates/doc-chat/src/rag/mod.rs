//! Retrieval-augmented chat: prompt assembly and the query pipeline

mod engine;
mod prompt;

pub use engine::{ChatEngine, EngineStatus, IndexState, IngestReport, QueryStage, FALLBACK_ANSWER};
pub use prompt::{unique_sources, PromptBuilder};
