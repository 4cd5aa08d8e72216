//! Gemini client for answer generation via Vertex AI

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{model_endpoint, with_timeout, GcpAuth, ProviderKind};
use crate::config::GcpConfig;
use crate::error::{Error, Result};
use crate::providers::llm::LlmProvider;

/// Gemini client via Vertex AI
pub struct GeminiClient {
    auth: Arc<GcpAuth>,
    model: String,
    location: String,
    temperature: f32,
    max_output_tokens: u32,
    timeout: Duration,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(auth: Arc<GcpAuth>, config: &GcpConfig) -> Self {
        Self {
            auth,
            model: config.generation_model.clone(),
            location: config.location.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            timeout: config.timeout(),
        }
    }

    fn endpoint(&self) -> String {
        model_endpoint(
            &self.location,
            self.auth.project_id(),
            &self.model,
            "generateContent",
        )
    }

    async fn generate_content(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self
            .auth
            .post(&self.endpoint())
            .await?
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::llm(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::llm(format!(
                "Gemini generation failed ({}): {}",
                status, body
            )));
        }

        let gen_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::llm(format!("Failed to parse Gemini response: {}", e)))?;

        gen_response
            .into_text()
            .ok_or_else(|| Error::llm("No text in Gemini response"))
    }
}

#[derive(serde::Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(serde::Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(serde::Serialize)]
struct Part {
    text: String,
}

#[derive(serde::Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(serde::Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(serde::Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(serde::Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(serde::Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    /// Text of the first candidate; multi-part answers are concatenated
    fn into_text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

#[async_trait]
impl LlmProvider for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        with_timeout(ProviderKind::Llm, self.timeout, self.generate_content(prompt)).await
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_part_response_is_joined() {
        let json = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello, "},{"text":"world."}]}}]}"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.into_text().as_deref(), Some("Hello, world."));
    }

    #[test]
    fn test_blocked_response_has_no_text() {
        let response: GenerateResponse = serde_json::from_str(r#"{"promptFeedback":{}}"#).unwrap();
        assert!(response.into_text().is_none());
    }
}
