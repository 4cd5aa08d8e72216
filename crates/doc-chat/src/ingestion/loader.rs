//! Flat corpus directory loading

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{Document, Page};

use super::parser::PdfParser;

/// A corpus file that could not be parsed
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of loading a corpus directory
#[derive(Debug, Default)]
pub struct LoadedCorpus {
    /// Successfully parsed documents, sorted by file name
    pub documents: Vec<Document>,
    /// Files that failed to parse
    pub skipped: Vec<SkippedFile>,
}

impl LoadedCorpus {
    /// File names of the parsed documents
    pub fn document_names(&self) -> Vec<String> {
        self.documents.iter().map(Document::file_name).collect()
    }
}

/// Whether a path has a `.pdf` extension (any case)
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Loads every PDF directly inside a corpus directory
pub struct DocumentLoader {
    corpus_dir: PathBuf,
}

impl DocumentLoader {
    pub fn new(corpus_dir: impl Into<PathBuf>) -> Self {
        Self {
            corpus_dir: corpus_dir.into(),
        }
    }

    /// PDF files in the corpus directory (non-recursive, sorted).
    /// A missing directory is created and reported as empty.
    pub fn list_pdfs(&self) -> Result<Vec<PathBuf>> {
        if !self.corpus_dir.exists() {
            std::fs::create_dir_all(&self.corpus_dir)?;
            tracing::warn!(
                "Data directory {} was missing, created it empty",
                self.corpus_dir.display()
            );
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.corpus_dir)? {
            let path = entry?.path();
            if path.is_file() && is_pdf(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Parse every PDF. A file that fails is logged and skipped.
    pub fn load(&self) -> Result<LoadedCorpus> {
        let mut corpus = LoadedCorpus::default();

        for path in self.list_pdfs()? {
            tracing::info!("Processing {}...", path.display());
            match parse_guarded(&path, || PdfParser::parse_file(&path)) {
                Ok(pages) => {
                    tracing::debug!("{}: {} pages with text", path.display(), pages.len());
                    corpus.documents.push(Document::new(path, pages));
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    corpus.skipped.push(SkippedFile {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let pages: usize = corpus.documents.iter().map(|d| d.pages.len()).sum();
        tracing::info!(
            "Loaded {} documents ({} pages), skipped {}",
            corpus.documents.len(),
            pages,
            corpus.skipped.len()
        );

        Ok(corpus)
    }
}

/// Run `parse`, turning a parser panic into a parse error for `path`
fn parse_guarded<F>(path: &Path, parse: F) -> Result<Vec<Page>>
where
    F: FnOnce() -> Result<Vec<Page>>,
{
    panic::catch_unwind(AssertUnwindSafe(parse)).unwrap_or_else(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Err(Error::document_parse(filename, format!("PDF parser panicked: {}", detail)))
    })
}
