//! Vector index and its on-disk representation

mod store;
mod vector_index;

pub use store::{IndexManifest, IndexStore, LoadOutcome, INDEX_FORMAT_VERSION};
pub use vector_index::{cosine_similarity, DistanceMetric, IndexedVector, ScoredChunk, VectorIndex};
