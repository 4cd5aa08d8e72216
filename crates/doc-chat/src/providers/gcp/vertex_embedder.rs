//! Vertex AI embedding provider (text-embedding-004)

use async_trait::async_trait;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use super::{model_endpoint, with_timeout, GcpAuth, ProviderKind};
use crate::config::GcpConfig;
use crate::error::{Error, Result};
use crate::providers::embedding::EmbeddingProvider;

/// Vertex AI accepts at most this many instances per predict call
const MAX_INSTANCES_PER_REQUEST: usize = 250;

/// Input token budget of one predict call
const MAX_TOKENS_PER_REQUEST: usize = 20_000;

/// Rough token estimate: four characters per token, rounded up
fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Split `texts` into consecutive batches that respect both the instance cap
/// and the token budget. A text over the budget on its own gets its own batch.
fn batch_ranges(texts: &[String]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut tokens = 0;

    for (i, text) in texts.iter().enumerate() {
        let cost = estimate_tokens(text);
        let full = i - start == MAX_INSTANCES_PER_REQUEST;
        if i > start && (full || tokens + cost > MAX_TOKENS_PER_REQUEST) {
            ranges.push(start..i);
            start = i;
            tokens = 0;
        }
        tokens += cost;
    }

    if start < texts.len() {
        ranges.push(start..texts.len());
    }
    ranges
}

/// Retrieval task hints understood by text-embedding-00x models
const TASK_QUERY: &str = "RETRIEVAL_QUERY";
const TASK_DOCUMENT: &str = "RETRIEVAL_DOCUMENT";

/// Vertex AI embedding provider
pub struct VertexAiEmbedder {
    auth: Arc<GcpAuth>,
    model: String,
    location: String,
    timeout: Duration,
}

impl VertexAiEmbedder {
    /// Create a new Vertex AI embedder
    pub fn new(auth: Arc<GcpAuth>, config: &GcpConfig) -> Self {
        Self {
            auth,
            model: config.embedding_model.clone(),
            location: config.location.clone(),
            timeout: config.timeout(),
        }
    }

    fn endpoint(&self) -> String {
        model_endpoint(&self.location, self.auth.project_id(), &self.model, "predict")
    }

    async fn predict(&self, texts: &[String], task_type: &'static str) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            instances: texts
                .iter()
                .map(|t| EmbedInstance {
                    content: t.clone(),
                    task_type,
                })
                .collect(),
        };

        let response = self
            .auth
            .post(&self.endpoint())
            .await?
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::embedding(format!("Vertex AI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::embedding(format!(
                "Vertex AI embedding failed ({}): {}",
                status, body
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse Vertex AI response: {}", e)))?;

        if embed_response.predictions.len() != texts.len() {
            return Err(Error::embedding(format!(
                "Vertex AI returned {} embeddings for {} texts",
                embed_response.predictions.len(),
                texts.len()
            )));
        }

        Ok(embed_response
            .predictions
            .into_iter()
            .map(|p| p.embeddings.values)
            .collect())
    }
}

#[derive(serde::Serialize)]
struct EmbedRequest {
    instances: Vec<EmbedInstance>,
}

#[derive(serde::Serialize)]
struct EmbedInstance {
    content: String,
    task_type: &'static str,
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    predictions: Vec<EmbedPrediction>,
}

#[derive(serde::Deserialize)]
struct EmbedPrediction {
    embeddings: EmbeddingValues,
}

#[derive(serde::Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for VertexAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut embeddings = with_timeout(
            ProviderKind::Embedding,
            self.timeout,
            self.predict(&texts, TASK_QUERY),
        )
        .await?;

        embeddings
            .pop()
            .ok_or_else(|| Error::embedding("No embedding in response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for range in batch_ranges(texts) {
            let embeddings = with_timeout(
                ProviderKind::Embedding,
                self.timeout,
                self.predict(&texts[range], TASK_DOCUMENT),
            )
            .await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn name(&self) -> &str {
        "vertex-ai"
    }
}
