//! Chat server binary
//!
//! Run with: cargo run -p doc-chat --bin doc-chat-server

use std::sync::Arc;

use doc_chat::{
    config::{BackendProvider, ChatConfig},
    providers::{ollama::ollama_providers, EmbeddingProvider, LlmProvider},
    server::ChatServer,
    ChatEngine,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Providers = (Arc<dyn EmbeddingProvider>, Arc<dyn LlmProvider>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_chat=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ChatConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Backend: {:?}", config.backend);
    tracing::info!("  - Data directory: {}", config.paths.data_dir.display());
    tracing::info!("  - Index directory: {}", config.paths.index_dir.display());
    tracing::info!(
        "  - Chunk size: {} (overlap {})",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );
    tracing::info!("  - Top k: {}", config.retrieval.top_k);

    let (embedder, llm) = build_providers(&config).await?;
    let engine = ChatEngine::initialize(&config, embedder, llm).await;

    let server = ChatServer::new(config, engine);
    tracing::info!("Endpoints:");
    tracing::info!("  POST /api/chat  - Ask a question");
    tracing::info!("  GET  /api/info  - Index status");
    tracing::info!("  GET  /health    - Liveness");

    server.start().await?;
    Ok(())
}

async fn build_providers(config: &ChatConfig) -> anyhow::Result<Providers> {
    match config.backend {
        BackendProvider::Gcp => gcp_providers(config),
        BackendProvider::Ollama => {
            tracing::info!("Checking Ollama at {}...", config.ollama.base_url);
            let (embedder, llm) = ollama_providers(&config.ollama)?;
            if !embedder.client().health_check().await {
                tracing::warn!("Ollama not available at {}", config.ollama.base_url);
                tracing::warn!(
                    "Start it with `ollama serve` and pull {} and {}",
                    config.ollama.embed_model,
                    config.ollama.generate_model
                );
            }
            let embedder: Arc<dyn EmbeddingProvider> = Arc::new(embedder);
            let llm: Arc<dyn LlmProvider> = Arc::new(llm);
            Ok((embedder, llm))
        }
    }
}

#[cfg(feature = "gcp")]
fn gcp_providers(config: &ChatConfig) -> anyhow::Result<Providers> {
    use doc_chat::providers::gcp::{GcpAuth, GeminiClient, VertexAiEmbedder};

    tracing::info!(
        "Using Vertex AI (project {}, location {})",
        config.gcp.project_id,
        config.gcp.location
    );
    if config.gcp.service_account_key_path.is_none() {
        tracing::info!("No GOOGLE_APPLICATION_CREDENTIALS set; using the metadata server for tokens");
    }

    let auth = Arc::new(GcpAuth::new(
        config.gcp.project_id.clone(),
        config.gcp.service_account_key_path.clone(),
    ));
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(VertexAiEmbedder::new(Arc::clone(&auth), &config.gcp));
    let llm: Arc<dyn LlmProvider> = Arc::new(GeminiClient::new(auth, &config.gcp));
    Ok((embedder, llm))
}

#[cfg(not(feature = "gcp"))]
fn gcp_providers(_config: &ChatConfig) -> anyhow::Result<Providers> {
    anyhow::bail!("Built without the `gcp` feature; set DOC_CHAT_BACKEND=ollama")
}
