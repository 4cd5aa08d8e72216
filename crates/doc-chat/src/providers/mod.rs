//! Provider abstractions for embeddings and answer generation
//!
//! Trait-based seams let the engine switch between Vertex AI and a local
//! Ollama server, and let tests substitute deterministic fakes.

pub mod embedding;
pub mod llm;
pub mod ollama;

#[cfg(feature = "gcp")]
pub mod gcp;

pub use embedding::EmbeddingProvider;
pub use llm::LlmProvider;
