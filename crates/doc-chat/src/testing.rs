//! Test helpers: synthetic PDFs and deterministic providers

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, Stream};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::providers::{EmbeddingProvider, LlmProvider};

const HASH_DIMENSIONS: usize = 32;

/// Write a PDF with one line of Courier text per page
pub(crate) fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Config rooted in a temporary directory
pub(crate) fn test_config(root: &Path) -> ChatConfig {
    let mut config = ChatConfig::default();
    config.paths.data_dir = root.join("data");
    config.paths.index_dir = root.join("faiss_index");
    config.paths.frontend_dir = None;
    config
}

/// Bag-of-words embedder: each lowercase word bumps one hashed dimension
pub(crate) struct HashEmbedder {
    calls: AtomicUsize,
    fail: bool,
}

impl HashEmbedder {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// Embedder whose every call errors
    pub(crate) fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    /// Number of texts embedded so far
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; HASH_DIMENSIONS];
        // Constant component keeps every vector non-zero
        vector[0] = 0.1;
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let slot = 1 + (hasher.finish() as usize) % (HASH_DIMENSIONS - 1);
            vector[slot] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::embedding("embedding service unavailable"));
        }
        Ok(Self::vector(text))
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// LLM that records every prompt and answers "Answer N"
pub(crate) struct RecordingLlm {
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
    answer: Option<String>,
}

impl RecordingLlm {
    pub(crate) fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            delay: None,
            answer: None,
        }
    }

    /// Sleeps for `delay` after recording each prompt
    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    /// Always answers with `answer`
    pub(crate) fn answering(answer: impl Into<String>) -> Self {
        Self {
            answer: Some(answer.into()),
            ..Self::new()
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for RecordingLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let count = {
            let mut prompts = self.prompts.lock();
            prompts.push(prompt.to_string());
            prompts.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.answer.clone().unwrap_or_else(|| format!("Answer {}", count)))
    }

    fn name(&self) -> &str {
        "recording"
    }

    fn model(&self) -> &str {
        "recording-model"
    }
}

/// LLM whose every call errors
pub(crate) struct FailingLlm;

#[async_trait]
impl LlmProvider for FailingLlm {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(Error::llm("model unavailable"))
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn model(&self) -> &str {
        "failing-model"
    }
}
