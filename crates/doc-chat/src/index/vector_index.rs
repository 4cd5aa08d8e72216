//! In-memory vector index with exact cosine top-k search

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Chunk;

/// Distance metric declared by an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
}

/// An embedding together with the chunk it was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedVector {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// A retrieved chunk with its similarity to the query
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity (-1.0 to 1.0, higher is more similar)
    pub score: f32,
}

/// Collection of indexed vectors sharing one dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    metric: DistanceMetric,
    dimensions: Option<usize>,
    /// Source document names announced to the model, fixed at build time
    documents: Vec<String>,
    entries: Vec<IndexedVector>,
}

impl VectorIndex {
    /// Create an empty index
    pub fn new(documents: Vec<String>) -> Self {
        Self {
            metric: DistanceMetric::Cosine,
            dimensions: None,
            documents,
            entries: Vec::new(),
        }
    }

    /// Build an index from chunks and their embeddings (same order)
    pub fn build(
        documents: Vec<String>,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(Error::index_io(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let mut index = Self::new(documents);
        for (chunk, vector) in chunks.into_iter().zip(embeddings) {
            index.insert(chunk, vector)?;
        }
        Ok(index)
    }

    /// Rebuild an index from previously persisted entries, re-validating each
    pub fn from_entries(documents: Vec<String>, entries: Vec<IndexedVector>) -> Result<Self> {
        let mut index = Self::new(documents);
        for entry in entries {
            index.insert(entry.chunk, entry.vector)?;
        }
        Ok(index)
    }

    /// Insert one vector. The first insert fixes the index dimension.
    pub fn insert(&mut self, chunk: Chunk, vector: Vec<f32>) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::index_io(format!("Empty embedding for chunk {}", chunk.id)));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::index_io(format!(
                "Embedding for chunk {} contains NaN or Infinity",
                chunk.id
            )));
        }

        match self.dimensions {
            Some(dim) if dim != vector.len() => {
                return Err(Error::index_io(format!(
                    "Dimension mismatch: index is {}D, got {}D",
                    dim,
                    vector.len()
                )));
            }
            Some(_) => {}
            None => self.dimensions = Some(vector.len()),
        }

        self.entries.push(IndexedVector { vector, chunk });
        Ok(())
    }

    /// Top-k entries by descending similarity. Ties keep insertion order.
    /// Returns fewer than `k` results when the index is smaller.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if let Some(dim) = self.dimensions {
            if dim != query.len() {
                return Err(Error::index_io(format!(
                    "Query dimension {} does not match index dimension {}",
                    query.len(),
                    dim
                )));
            }
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(query, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Document names recorded when the index was built
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn entries(&self) -> &[IndexedVector] {
        &self.entries
    }
}

/// Cosine similarity; zero vectors score 0.0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (dot / denom) as f32
    }
}
