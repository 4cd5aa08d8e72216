//! Configuration for the chat service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "DOC_CHAT_CONFIG";

/// Project used when `GOOGLE_CLOUD_PROJECT` is not set
pub const DEFAULT_PROJECT_ID: &str = "doc-chat-local";

/// Region used when `GOOGLE_CLOUD_LOCATION` is not set
pub const DEFAULT_LOCATION: &str = "us-central1";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Backend provider (gcp or ollama)
    pub backend: BackendProvider,
    /// Server configuration
    pub server: ServerConfig,
    /// Corpus, index and frontend locations
    pub paths: PathsConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Prompt size budget
    pub prompt: PromptConfig,
    /// Vertex AI configuration
    pub gcp: GcpConfig,
    /// Ollama configuration
    pub ollama: OllamaConfig,
}

impl ChatConfig {
    /// Load configuration: defaults, then the optional TOML file named by
    /// `DOC_CHAT_CONFIG`, then environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(project) = non_empty("GOOGLE_CLOUD_PROJECT") {
            self.gcp.project_id = project;
        }
        if let Some(location) = non_empty("GOOGLE_CLOUD_LOCATION") {
            self.gcp.location = location;
        }
        if let Some(key_path) = non_empty("GOOGLE_APPLICATION_CREDENTIALS") {
            self.gcp.service_account_key_path = Some(PathBuf::from(key_path));
        }
        if let Some(backend) = non_empty("DOC_CHAT_BACKEND") {
            match backend.to_lowercase().as_str() {
                "gcp" => self.backend = BackendProvider::Gcp,
                "ollama" => self.backend = BackendProvider::Ollama,
                other => tracing::warn!("Unknown DOC_CHAT_BACKEND '{}', keeping {:?}", other, self.backend),
            }
        }
        if let Some(dir) = non_empty("DOC_CHAT_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("DOC_CHAT_INDEX_DIR") {
            self.paths.index_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("DOC_CHAT_FRONTEND_DIR") {
            self.paths.frontend_dir = Some(PathBuf::from(dir));
        }
        if let Some(host) = non_empty("DOC_CHAT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty("DOC_CHAT_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid DOC_CHAT_PORT '{}'", port),
            }
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Flat directory of PDF files
    pub data_dir: PathBuf,
    /// Persisted vector index directory (sibling of the corpus)
    pub index_dir: PathBuf,
    /// Prebuilt frontend bundle served at `/`
    pub frontend_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            index_dir: PathBuf::from("faiss_index"),
            frontend_dir: Some(PathBuf::from("frontend")),
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between neighbouring chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,
    /// Texts per embedding request during ingestion
    pub embed_batch_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            embed_batch_size: 100,
        }
    }
}

/// Upper bounds on the rendered prompt sections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Characters of retrieved context rendered into the prompt
    pub max_context_chars: usize,
    /// Characters of conversation history rendered into the prompt
    pub max_history_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 12_000,
            max_history_chars: 6_000,
        }
    }
}

/// Backend provider selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Google Cloud Vertex AI (embeddings + Gemini)
    #[default]
    Gcp,
    /// Local Ollama server
    Ollama,
}

/// Google Cloud Vertex AI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    /// GCP project ID
    pub project_id: String,
    /// GCP region (e.g., "us-central1")
    pub location: String,
    /// Path to service account JSON key file
    pub service_account_key_path: Option<PathBuf>,
    /// Embedding model
    pub embedding_model: String,
    /// Generation model
    pub generation_model: String,
    /// Sampling temperature for generation
    pub temperature: f32,
    /// Maximum output tokens for generation
    pub max_output_tokens: u32,
    /// Timeout for a single provider call in seconds
    pub timeout_secs: u64,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            service_account_key_path: None,
            embedding_model: "text-embedding-004".to_string(),
            generation_model: "gemini-2.0-flash".to_string(),
            temperature: 0.2,
            max_output_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

impl GcpConfig {
    /// Provider call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Ollama configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Embedding model name
    pub embed_model: String,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            generate_model: "llama3.2:3b".to_string(),
            temperature: 0.2,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

impl OllamaConfig {
    /// Provider call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ChatConfig::default();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.gcp.project_id, DEFAULT_PROJECT_ID);
        assert_eq!(config.gcp.location, DEFAULT_LOCATION);
        assert_eq!(config.backend, BackendProvider::Gcp);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GOOGLE_CLOUD_PROJECT", "my-project"),
            ("GOOGLE_CLOUD_LOCATION", "europe-west4"),
            ("DOC_CHAT_BACKEND", "ollama"),
            ("DOC_CHAT_PORT", "9000"),
            ("DOC_CHAT_DATA_DIR", "/srv/pdfs"),
        ]);

        let mut config = ChatConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.gcp.project_id, "my-project");
        assert_eq!(config.gcp.location, "europe-west4");
        assert_eq!(config.backend, BackendProvider::Ollama);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.paths.data_dir, PathBuf::from("/srv/pdfs"));
    }

    #[test]
    fn test_blank_env_falls_back_to_default() {
        let mut config = ChatConfig::default();
        config.apply_env(|key| (key == "GOOGLE_CLOUD_PROJECT").then(|| "  ".to_string()));
        assert_eq!(config.gcp.project_id, DEFAULT_PROJECT_ID);
    }

    #[test]
    fn test_partial_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc-chat.toml");
        std::fs::write(
            &path,
            "[chunking]\nchunk_size = 500\n\n[retrieval]\ntop_k = 6\n",
        )
        .unwrap();

        let config = ChatConfig::from_file(&path).unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 6);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ChatConfig::from_file(Path::new("/nonexistent/doc-chat.toml")).unwrap();
        assert_eq!(config.server.port, 8000);
    }
}
