//! Document, page and chunk types with source tracking

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One text page of a source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Page number (1-indexed)
    pub number: u32,
    /// Extracted text
    pub text: String,
}

/// A parsed corpus file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Path of the source file
    pub path: PathBuf,
    /// Pages in reading order
    pub pages: Vec<Page>,
}

impl Document {
    /// Create a document from its path and pages
    pub fn new(path: impl Into<PathBuf>, pages: Vec<Page>) -> Self {
        Self {
            path: path.into(),
            pages,
        }
    }

    /// File name without directories
    pub fn file_name(&self) -> String {
        basename(&self.path.to_string_lossy())
    }
}

/// A bounded span of text cut from one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Chunk text
    pub text: String,
    /// Path of the originating document
    pub source: String,
    /// Page the chunk was cut from
    pub page_number: u32,
    /// Reading-order position within the document (0-indexed)
    pub position: u32,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(text: String, source: &Path, page_number: u32, position: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            source: source.to_string_lossy().to_string(),
            page_number,
            position,
        }
    }

    /// Source identifier shown to users (file name only)
    pub fn source_name(&self) -> String {
        basename(&self.source)
    }
}

/// Last path component, accepting both `/` and `\` separators
pub fn basename(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basename() {
        assert_eq!(basename("a/doc1.pdf"), "doc1.pdf");
        assert_eq!(basename("/srv/data/report.pdf"), "report.pdf");
        assert_eq!(basename("C:\\corpus\\notes.pdf"), "notes.pdf");
        assert_eq!(basename("plain.pdf"), "plain.pdf");
    }

    #[test]
    fn test_chunk_source_name() {
        let chunk = Chunk::new("text".to_string(), Path::new("data/manual.pdf"), 2, 0);
        assert_eq!(chunk.source_name(), "manual.pdf");
        assert_eq!(chunk.page_number, 2);
    }
}
