//! LLM provider trait for answer generation

use async_trait::async_trait;

use crate::error::Result;

/// Maps a fully assembled prompt to generated text
///
/// Implementations:
/// - `GeminiClient`: Google Vertex AI (gemini-2.0-flash)
/// - `OllamaLlm`: Local Ollama server
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model being used
    fn model(&self) -> &str;
}
