//! Google Cloud Vertex AI providers
//!
//! - text-embedding-004 for embeddings
//! - Gemini for answer generation

mod auth;
mod gemini_client;
mod vertex_embedder;

pub use auth::GcpAuth;
pub use gemini_client::GeminiClient;
pub use vertex_embedder::VertexAiEmbedder;

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Which provider failed, for error mapping
#[derive(Debug, Clone, Copy)]
enum ProviderKind {
    Embedding,
    Llm,
}

/// Bound a Vertex AI call by `limit`; elapsing becomes a provider error
async fn with_timeout<T, F>(kind: ProviderKind, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            let message = format!("request timed out after {:?}", limit);
            Err(match kind {
                ProviderKind::Embedding => Error::embedding(message),
                ProviderKind::Llm => Error::llm(message),
            })
        }
    }
}

/// Regional Vertex AI publisher model endpoint
fn model_endpoint(location: &str, project_id: &str, model: &str, method: &str) -> String {
    format!(
        "https://{location}-aiplatform.googleapis.com/v1/projects/{project_id}/locations/{location}/publishers/google/models/{model}:{method}"
    )
}
