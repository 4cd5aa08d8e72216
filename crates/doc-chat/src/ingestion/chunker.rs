//! Text chunking with page and position tracking
//!
//! Recursive character splitting: text is cut at the coarsest separator that
//! occurs (paragraphs, then lines, then words, then grapheme clusters) and the
//! pieces are merged back into windows of at most `chunk_size` characters,
//! each window repeating up to `overlap` characters of its predecessor.

use std::collections::VecDeque;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::types::{Chunk, Document};

/// Separators tried in order; the empty separator means grapheme clusters
const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Text chunker with configurable size and overlap
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Overlap between chunks in characters
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker. Overlap is clamped below the chunk size.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    /// Create a chunker from configuration
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Chunk a document page by page. Chunks never cross document boundaries
    /// and their position increases in reading order.
    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut position = 0u32;

        for page in &doc.pages {
            for text in self.split_text(&page.text) {
                chunks.push(Chunk::new(text, &doc.path, page.number, position));
                position += 1;
            }
        }

        chunks
    }

    /// Split text into overlapping pieces of at most `chunk_size` characters
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Coarsest separator present in the text; "" always matches
        let (index, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(i, sep)| (i, *sep))
            .unwrap_or((separators.len(), ""));
        let finer = separators.get(index + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.graphemes(true).collect()
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut output = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                output.extend(self.merge(&pending, separator));
                pending.clear();
            }

            if finer.is_empty() {
                output.push(piece.trim().to_string());
            } else {
                output.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            output.extend(self.merge(&pending, separator));
        }

        output.retain(|chunk| !chunk.is_empty());
        output
    }

    /// Merge small pieces into windows, carrying the tail of each window into the next
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        let sep_if = |non_empty: bool| if non_empty { sep_len } else { 0 };

        for piece in pieces {
            let len = char_len(piece);

            if total + len + sep_if(!window.is_empty()) > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window, separator);

                // Drop from the front until the carried tail fits the overlap
                // and the next piece fits the window
                while total > self.overlap
                    || (total > 0 && total + len + sep_if(!window.is_empty()) > self.chunk_size)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + sep_if(!window.is_empty());
                }
            }

            total += len + sep_if(!window.is_empty());
            window.push_back(piece);
        }

        push_joined(&mut chunks, &window, separator);
        chunks
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
