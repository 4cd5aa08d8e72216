//! Chat engine: index lifecycle plus the per-query pipeline
//!
//! Startup loads the persisted index or builds it from the corpus. Each query
//! then runs retrieve, prompt, generate and record under its session's lock.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::config::{ChatConfig, PromptConfig, RetrievalConfig};
use crate::error::{Error, Result};
use crate::index::{IndexStore, LoadOutcome, ScoredChunk, VectorIndex};
use crate::ingestion::{DocumentLoader, TextChunker};
use crate::memory::ConversationStore;
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::types::{ChatResponse, Chunk, ConversationTurn, SessionId};

use super::prompt::{unique_sources, PromptBuilder};

/// Answer given when there is no index to search
pub const FALLBACK_ANSWER: &str = "System is initializing or no data found.";

/// How the engine came up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Loaded from the index directory
    Loaded,
    /// Built from the corpus and persisted during this start
    Built,
    /// The corpus produced no chunks
    Empty,
    /// Startup failed; serving fallback answers
    Degraded,
}

impl IndexState {
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Loaded | Self::Built)
    }
}

/// Where a query was when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Received,
    Validated,
    Retrieved,
    Prompted,
    Generated,
    Recorded,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Retrieved => "retrieved",
            Self::Prompted => "prompted",
            Self::Generated => "generated",
            Self::Recorded => "recorded",
        };
        f.write_str(name)
    }
}

/// Engine summary for the info endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: IndexState,
    pub documents: Vec<String>,
    pub chunks: usize,
    pub dimensions: Option<usize>,
    pub embedder: String,
    pub llm_model: String,
    pub sessions: usize,
}

/// Outcome of a corpus ingestion
#[derive(Debug)]
pub struct IngestReport {
    /// `None` when the corpus produced no chunks
    pub index: Option<VectorIndex>,
    pub documents: usize,
    pub skipped: usize,
    pub chunks: usize,
}

/// Retrieval-augmented chat over one vector index
pub struct ChatEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    index: Option<Arc<VectorIndex>>,
    state: IndexState,
    conversations: ConversationStore,
    retrieval: RetrievalConfig,
    prompt: PromptConfig,
}

impl ChatEngine {
    /// Load or build the index. Never fails: problems are logged and the
    /// engine comes up in a state that answers with [`FALLBACK_ANSWER`].
    pub async fn initialize(
        config: &ChatConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        tracing::info!(
            "Initializing chat engine (embedder: {}, llm: {} {})",
            embedder.name(),
            llm.name(),
            llm.model()
        );

        let (index, state) = match Self::open_index(config, embedder.as_ref()).await {
            Ok(Some((index, state))) => (Some(Arc::new(index)), state),
            Ok(None) => {
                tracing::warn!(
                    "No documents to index in {}; answering with the fallback message",
                    config.paths.data_dir.display()
                );
                (None, IndexState::Empty)
            }
            Err(e) => {
                tracing::error!("Chat engine initialization failed: {}", e);
                (None, IndexState::Degraded)
            }
        };

        if let Some(index) = &index {
            tracing::info!(
                "Chat engine ready: {} chunks from {} documents ({:?})",
                index.len(),
                index.documents().len(),
                state
            );
        }

        Self::from_parts(index, state, embedder, llm, config)
    }

    /// Engine over an already built index
    pub fn with_index(
        index: VectorIndex,
        config: &ChatConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        let (index, state) = if index.is_empty() {
            (None, IndexState::Empty)
        } else {
            (Some(Arc::new(index)), IndexState::Loaded)
        };
        Self::from_parts(index, state, embedder, llm, config)
    }

    fn from_parts(
        index: Option<Arc<VectorIndex>>,
        state: IndexState,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            embedder,
            llm,
            index,
            state,
            conversations: ConversationStore::new(),
            retrieval: config.retrieval.clone(),
            prompt: config.prompt.clone(),
        }
    }

    /// Persisted index if usable, otherwise a fresh ingestion
    async fn open_index(
        config: &ChatConfig,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Option<(VectorIndex, IndexState)>> {
        let store = IndexStore::new(&config.paths.index_dir);

        let outcome = {
            let store = store.clone();
            blocking(move || store.load()).await?
        };

        match outcome {
            LoadOutcome::Loaded(index) => {
                tracing::info!("Loading existing vector index from {}", store.dir().display());
                return Ok(Some((index, IndexState::Loaded)));
            }
            LoadOutcome::Missing => {
                tracing::info!(
                    "No vector index at {}, building from {}",
                    store.dir().display(),
                    config.paths.data_dir.display()
                );
            }
            LoadOutcome::Invalid(reason) => {
                tracing::warn!(
                    "Ignoring unusable vector index at {} ({}), rebuilding",
                    store.dir().display(),
                    reason
                );
            }
        }

        let report = Self::ingest(config, embedder).await?;
        let Some(index) = report.index else {
            return Ok(None);
        };

        let index = blocking(move || store.persist(&index).map(|_| index)).await?;
        Ok(Some((index, IndexState::Built)))
    }

    /// Parse, chunk and embed the corpus. Does not persist.
    pub async fn ingest(config: &ChatConfig, embedder: &dyn EmbeddingProvider) -> Result<IngestReport> {
        let loader = DocumentLoader::new(&config.paths.data_dir);
        let corpus = blocking(move || loader.load()).await?;

        let chunker = TextChunker::from_config(&config.chunking);
        let chunks: Vec<Chunk> = corpus
            .documents
            .iter()
            .flat_map(|doc| chunker.chunk_document(doc))
            .collect();

        tracing::info!(
            "Total documents loaded: {} ({} pages), chunks created: {}",
            corpus.documents.len(),
            corpus.documents.iter().map(|d| d.pages.len()).sum::<usize>(),
            chunks.len()
        );

        let mut report = IngestReport {
            index: None,
            documents: corpus.documents.len(),
            skipped: corpus.skipped.len(),
            chunks: chunks.len(),
        };

        if chunks.is_empty() {
            return Ok(report);
        }

        let embeddings = Self::embed_chunks(embedder, &chunks, config.retrieval.embed_batch_size).await?;
        report.index = Some(VectorIndex::build(corpus.document_names(), chunks, embeddings)?);
        Ok(report)
    }

    async fn embed_chunks(
        embedder: &dyn EmbeddingProvider,
        chunks: &[Chunk],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>> {
        tracing::info!("Creating embeddings for {} chunks using {}...", chunks.len(), embedder.name());

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(Error::embedding(format!(
                    "Provider returned {} embeddings for {} texts",
                    vectors.len(),
                    texts.len()
                )));
            }
            embeddings.extend(vectors);
            tracing::debug!("Embedded {}/{} chunks", embeddings.len(), chunks.len());
        }
        Ok(embeddings)
    }

    /// Top-k chunks for a query, most relevant first. Empty without an index.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let Some(index) = &self.index else {
            return Ok(Vec::new());
        };
        let query_embedding = self.embedder.embed(query).await?;
        index.search(&query_embedding, k)
    }

    /// Answer a question within a session's conversation
    pub async fn chat(&self, session: &SessionId, message: &str) -> Result<ChatResponse> {
        let question = message.trim();
        if question.is_empty() {
            return Err(Error::EmptyQuery);
        }

        let Some(index) = &self.index else {
            return Ok(ChatResponse::new(FALLBACK_ANSWER, Vec::new()));
        };

        let handle = self.conversations.session(session);
        let mut conversation = handle.lock().await;
        let mut stage = QueryStage::Validated;

        let result = self
            .answer(index, conversation.history(), question, &mut stage)
            .await;

        match result {
            Ok((answer, sources)) => {
                conversation.append(ConversationTurn::new(question, answer.clone()));
                tracing::debug!(
                    "Session {}: turn {} recorded ({} sources)",
                    session,
                    conversation.len(),
                    sources.len()
                );
                Ok(ChatResponse::new(answer, sources))
            }
            Err(e) => {
                tracing::error!("Chat query failed in session {} after stage {}: {}", session, stage, e);
                Err(e)
            }
        }
    }

    async fn answer(
        &self,
        index: &VectorIndex,
        history: &[ConversationTurn],
        question: &str,
        stage: &mut QueryStage,
    ) -> Result<(String, Vec<String>)> {
        let query_embedding = self.embedder.embed(question).await?;
        let results = index.search(&query_embedding, self.retrieval.top_k)?;
        *stage = QueryStage::Retrieved;

        let chunks: Vec<Chunk> = results.into_iter().map(|r| r.chunk).collect();
        let prompt = PromptBuilder::build_chat_prompt(
            index.documents(),
            &chunks,
            history,
            question,
            &self.prompt,
        );
        *stage = QueryStage::Prompted;

        let answer = self.llm.generate(&prompt).await?;
        *stage = QueryStage::Generated;

        Ok((answer.trim().to_string(), unique_sources(&chunks)))
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Documents announced to the model
    pub fn documents(&self) -> &[String] {
        self.index.as_ref().map(|i| i.documents()).unwrap_or(&[])
    }

    pub fn index_len(&self) -> usize {
        self.index.as_ref().map(|i| i.len()).unwrap_or(0)
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state,
            documents: self.documents().to_vec(),
            chunks: self.index_len(),
            dimensions: self.index.as_ref().and_then(|i| i.dimensions()),
            embedder: self.embedder.name().to_string(),
            llm_model: self.llm.model().to_string(),
            sessions: self.conversations.session_count(),
        }
    }
}

/// Run filesystem-heavy work off the async workers
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::internal(format!("Blocking task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, write_pdf, FailingLlm, HashEmbedder, RecordingLlm};
    use std::fs;
    use std::time::Duration;

    async fn engine_with(
        config: &ChatConfig,
        embedder: Arc<HashEmbedder>,
        llm: Arc<dyn LlmProvider>,
    ) -> ChatEngine {
        ChatEngine::initialize(config, embedder, llm).await
    }

    fn corpus_with_two_docs(config: &ChatConfig) {
        fs::create_dir_all(&config.paths.data_dir).unwrap();
        write_pdf(
            &config.paths.data_dir.join("widgets.pdf"),
            &["Widgets are small blue devices", "A widget costs five dollars"],
        );
        write_pdf(
            &config.paths.data_dir.join("gadgets.pdf"),
            &["Gadgets are large red machines"],
        );
    }

    #[tokio::test]
    async fn test_empty_query_does_no_work() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        corpus_with_two_docs(&config);

        let embedder = Arc::new(HashEmbedder::new());
        let llm = Arc::new(RecordingLlm::new());
        let engine = engine_with(&config, Arc::clone(&embedder), llm.clone()).await;
        let embedded_at_startup = embedder.calls();

        let err = engine.chat(&SessionId::default(), "   \n\t").await.unwrap_err();
        assert!(matches!(err, Error::EmptyQuery));
        assert_eq!(embedder.calls(), embedded_at_startup);
        assert!(llm.prompts().is_empty());
        assert!(engine.conversations().history(&SessionId::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_fallback() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());

        let llm = Arc::new(RecordingLlm::new());
        let engine = engine_with(&config, Arc::new(HashEmbedder::new()), llm.clone()).await;

        assert_eq!(engine.state(), IndexState::Empty);
        assert!(!engine.is_ready());

        let response = engine.chat(&SessionId::default(), "hello").await.unwrap();
        assert_eq!(response.response, "System is initializing or no data found.");
        assert!(response.sources.is_empty());
        assert!(llm.prompts().is_empty());

        // Nothing persisted, so the next start tries again
        assert!(!IndexStore::new(&config.paths.index_dir).exists());
    }

    #[tokio::test]
    async fn test_three_page_pdf_is_indexed_and_persisted() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        fs::create_dir_all(&config.paths.data_dir).unwrap();
        write_pdf(
            &config.paths.data_dir.join("manual.pdf"),
            &["Chapter one text", "Chapter two text", "Chapter three text"],
        );

        let report = ChatEngine::ingest(&config, &HashEmbedder::new()).await.unwrap();
        assert!(report.chunks >= 3);
        assert_eq!(report.index.as_ref().unwrap().len(), report.chunks);

        let engine = engine_with(&config, Arc::new(HashEmbedder::new()), Arc::new(RecordingLlm::new())).await;
        assert_eq!(engine.state(), IndexState::Built);
        assert_eq!(engine.index_len(), report.chunks);
        assert_eq!(engine.documents(), &["manual.pdf".to_string()]);
        assert!(config.paths.index_dir.join("manifest.json").is_file());
    }

    #[tokio::test]
    async fn test_second_start_loads_without_embedding() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        corpus_with_two_docs(&config);

        let first = engine_with(&config, Arc::new(HashEmbedder::new()), Arc::new(RecordingLlm::new())).await;
        assert_eq!(first.state(), IndexState::Built);

        let manifest = fs::read(config.paths.index_dir.join("manifest.json")).unwrap();
        let vectors = fs::read(config.paths.index_dir.join("vectors.bin")).unwrap();

        let embedder = Arc::new(HashEmbedder::new());
        let second = engine_with(&config, Arc::clone(&embedder), Arc::new(RecordingLlm::new())).await;

        assert_eq!(second.state(), IndexState::Loaded);
        assert_eq!(second.index_len(), first.index_len());
        assert_eq!(embedder.calls(), 0);
        assert_eq!(fs::read(config.paths.index_dir.join("manifest.json")).unwrap(), manifest);
        assert_eq!(fs::read(config.paths.index_dir.join("vectors.bin")).unwrap(), vectors);
    }

    #[tokio::test]
    async fn test_corrupt_index_is_rebuilt() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        corpus_with_two_docs(&config);
        fs::create_dir_all(&config.paths.index_dir).unwrap();
        fs::write(config.paths.index_dir.join("manifest.json"), b"{ not json").unwrap();

        let engine = engine_with(&config, Arc::new(HashEmbedder::new()), Arc::new(RecordingLlm::new())).await;
        assert_eq!(engine.state(), IndexState::Built);
        assert!(engine.index_len() > 0);
    }

    #[tokio::test]
    async fn test_follow_up_prompt_contains_history() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        corpus_with_two_docs(&config);

        let llm = Arc::new(RecordingLlm::new());
        let engine = engine_with(&config, Arc::new(HashEmbedder::new()), llm.clone()).await;
        let session = SessionId::default();

        let first = engine.chat(&session, "What is X?").await.unwrap();
        engine.chat(&session, "What about its cost?").await.unwrap();

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("Chat History"));
        assert!(prompts[1].contains("Human: What is X?"));
        assert!(prompts[1].contains(&format!("Assistant: {}", first.response)));
        assert!(prompts[1].contains("widgets.pdf, gadgets.pdf") || prompts[1].contains("gadgets.pdf, widgets.pdf"));
    }

    #[tokio::test]
    async fn test_sources_are_unique_basenames() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        corpus_with_two_docs(&config);

        let engine = engine_with(&config, Arc::new(HashEmbedder::new()), Arc::new(RecordingLlm::new())).await;
        assert_eq!(engine.index_len(), 3);

        // top_k 4 covers all three chunks: two from widgets.pdf, one from gadgets.pdf
        let response = engine.chat(&SessionId::default(), "Tell me about widgets").await.unwrap();
        assert_eq!(response.sources, vec!["gadgets.pdf", "widgets.pdf"]);
    }

    #[tokio::test]
    async fn test_retrieve_caps_at_index_size() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        fs::create_dir_all(&config.paths.data_dir).unwrap();
        write_pdf(&config.paths.data_dir.join("pair.pdf"), &["First page", "Second page"]);

        let engine = engine_with(&config, Arc::new(HashEmbedder::new()), Arc::new(RecordingLlm::new())).await;
        assert_eq!(engine.index_len(), 2);

        let results = engine.retrieve("page", 4).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_failed_generation_is_not_recorded() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        corpus_with_two_docs(&config);

        let engine = engine_with(&config, Arc::new(HashEmbedder::new()), Arc::new(FailingLlm)).await;
        let session = SessionId::default();

        let err = engine.chat(&session, "What is X?").await.unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
        assert!(engine.conversations().history(&session).await.is_empty());
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_history() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        corpus_with_two_docs(&config);

        let llm = Arc::new(RecordingLlm::new());
        let engine = engine_with(&config, Arc::new(HashEmbedder::new()), llm.clone()).await;

        engine.chat(&SessionId::new("alice"), "Alice question").await.unwrap();
        engine.chat(&SessionId::new("bob"), "Bob question").await.unwrap();

        let prompts = llm.prompts();
        assert!(!prompts[1].contains("Alice question"));
        assert_eq!(engine.conversations().history(&SessionId::new("alice")).await.len(), 1);
        assert_eq!(engine.conversations().history(&SessionId::new("bob")).await.len(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        corpus_with_two_docs(&config);

        let engine = ChatEngine::initialize(
            &config,
            Arc::new(HashEmbedder::failing()),
            Arc::new(RecordingLlm::new()),
        )
        .await;

        assert_eq!(engine.state(), IndexState::Degraded);
        let response = engine.chat(&SessionId::default(), "anything").await.unwrap();
        assert_eq!(response.response, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_broken_pdf_does_not_sink_ingestion() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        fs::create_dir_all(&config.paths.data_dir).unwrap();

        let good = config.paths.data_dir.join("good.pdf");
        write_pdf(&good, &["Widgets are small blue devices"]);
        let bytes = fs::read(&good).unwrap();
        fs::write(config.paths.data_dir.join("bad.pdf"), &bytes[..bytes.len() / 2]).unwrap();

        let engine = engine_with(&config, Arc::new(HashEmbedder::new()), Arc::new(RecordingLlm::new())).await;

        assert_eq!(engine.state(), IndexState::Built);
        assert!(engine.documents().contains(&"good.pdf".to_string()));
        assert!(engine.index_len() > 0);
    }

    #[tokio::test]
    async fn test_long_answer_stays_in_follow_up_history() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        corpus_with_two_docs(&config);

        let llm = Arc::new(RecordingLlm::answering("x".repeat(6500)));
        let engine = engine_with(&config, Arc::new(HashEmbedder::new()), llm.clone()).await;
        let session = SessionId::default();

        engine.chat(&session, "What is X?").await.unwrap();
        engine.chat(&session, "What about its cost?").await.unwrap();

        let prompts = llm.prompts();
        assert!(prompts[1].contains("Chat History:\nHuman: What is X?\nAssistant: xxx"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_turns_in_one_session_are_serialized() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        corpus_with_two_docs(&config);

        let llm = Arc::new(RecordingLlm::slow(Duration::from_millis(50)));
        let engine = Arc::new(
            engine_with(&config, Arc::new(HashEmbedder::new()), llm.clone()).await,
        );
        let session = SessionId::new("shared");

        let tasks: Vec<_> = (0..5)
            .map(|i| {
                let engine = Arc::clone(&engine);
                let session = session.clone();
                tokio::spawn(async move { engine.chat(&session, &format!("Question {}", i)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Each prompt sees every turn recorded before it, none in flight
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 5);
        for (i, prompt) in prompts.iter().enumerate() {
            assert_eq!(prompt.matches("Human: ").count(), i);
        }

        let history = engine.conversations().history(&session).await;
        assert_eq!(history.len(), 5);
        for (i, turn) in history.iter().enumerate() {
            assert_eq!(turn.answer, format!("Answer {}", i + 1));
        }
    }
}
