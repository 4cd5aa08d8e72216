//! On-disk persistence for the vector index
//!
//! An index directory holds `manifest.json` (format version, dimensions,
//! document names, checksum) and `vectors.bin` (bincode-encoded entries).
//! Writes go to a sibling temporary directory that is renamed into place, so
//! readers only ever see a complete index or none at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::Chunk;
use uuid::Uuid;

use super::vector_index::{DistanceMetric, IndexedVector, VectorIndex};

/// Current on-disk format
pub const INDEX_FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const VECTORS_FILE: &str = "vectors.bin";

/// Metadata describing a persisted index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub dimensions: Option<usize>,
    pub metric: DistanceMetric,
    pub entry_count: usize,
    pub documents: Vec<String>,
    /// Hex SHA-256 of `vectors.bin`
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Flat on-disk form of an [`IndexedVector`]; ids are stored as text
#[derive(Serialize, Deserialize)]
struct StoredVector {
    id: String,
    text: String,
    source: String,
    page_number: u32,
    position: u32,
    vector: Vec<f32>,
}

impl From<&IndexedVector> for StoredVector {
    fn from(entry: &IndexedVector) -> Self {
        Self {
            id: entry.chunk.id.to_string(),
            text: entry.chunk.text.clone(),
            source: entry.chunk.source.clone(),
            page_number: entry.chunk.page_number,
            position: entry.chunk.position,
            vector: entry.vector.clone(),
        }
    }
}

impl TryFrom<StoredVector> for IndexedVector {
    type Error = uuid::Error;

    fn try_from(stored: StoredVector) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            vector: stored.vector,
            chunk: Chunk {
                id: Uuid::parse_str(&stored.id)?,
                text: stored.text,
                source: stored.source,
                page_number: stored.page_number,
                position: stored.position,
            },
        })
    }
}

/// Result of looking for a persisted index
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(VectorIndex),
    /// No index directory or manifest
    Missing,
    /// Something is on disk but cannot be used; the caller should rebuild
    Invalid(String),
}

/// Reads and writes a vector index under one directory
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a manifest is present (says nothing about its validity)
    pub fn exists(&self) -> bool {
        self.dir.join(MANIFEST_FILE).is_file()
    }

    /// Load the persisted index. Never modifies the directory.
    ///
    /// Corrupt or incompatible contents are reported as [`LoadOutcome::Invalid`];
    /// only unexpected IO failures (permissions and the like) are errors.
    pub fn load(&self) -> Result<LoadOutcome> {
        let manifest_bytes = match read_optional(&self.dir.join(MANIFEST_FILE))? {
            Some(bytes) => bytes,
            None => return Ok(LoadOutcome::Missing),
        };

        let manifest: IndexManifest = match serde_json::from_slice(&manifest_bytes) {
            Ok(manifest) => manifest,
            Err(e) => return Ok(LoadOutcome::Invalid(format!("unreadable manifest: {}", e))),
        };

        if manifest.format_version != INDEX_FORMAT_VERSION {
            return Ok(LoadOutcome::Invalid(format!(
                "unsupported format version {} (expected {})",
                manifest.format_version, INDEX_FORMAT_VERSION
            )));
        }

        let vectors = match read_optional(&self.dir.join(VECTORS_FILE))? {
            Some(bytes) => bytes,
            None => return Ok(LoadOutcome::Invalid(format!("{} is missing", VECTORS_FILE))),
        };

        let checksum = sha256_hex(&vectors);
        if checksum != manifest.checksum {
            return Ok(LoadOutcome::Invalid(format!(
                "checksum mismatch: manifest {}, file {}",
                manifest.checksum, checksum
            )));
        }

        let stored: Vec<StoredVector> =
            match bincode::serde::decode_from_slice(&vectors, bincode::config::standard()) {
                Ok((stored, _)) => stored,
                Err(e) => return Ok(LoadOutcome::Invalid(format!("undecodable vectors: {}", e))),
            };

        let entries = match stored
            .into_iter()
            .map(IndexedVector::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
        {
            Ok(entries) => entries,
            Err(e) => return Ok(LoadOutcome::Invalid(format!("bad chunk id: {}", e))),
        };

        if entries.len() != manifest.entry_count {
            return Ok(LoadOutcome::Invalid(format!(
                "manifest lists {} entries, found {}",
                manifest.entry_count,
                entries.len()
            )));
        }

        let index = match VectorIndex::from_entries(manifest.documents, entries) {
            Ok(index) => index,
            Err(e) => return Ok(LoadOutcome::Invalid(e.to_string())),
        };

        if index.dimensions() != manifest.dimensions {
            return Ok(LoadOutcome::Invalid(format!(
                "manifest dimensions {:?} do not match vectors {:?}",
                manifest.dimensions,
                index.dimensions()
            )));
        }

        Ok(LoadOutcome::Loaded(index))
    }

    /// Persist the index, replacing whatever was there
    pub fn persist(&self, index: &VectorIndex) -> Result<IndexManifest> {
        let stored: Vec<StoredVector> = index.entries().iter().map(StoredVector::from).collect();
        let vectors = bincode::serde::encode_to_vec(&stored, bincode::config::standard())
            .map_err(|e| Error::index_io(format!("Failed to encode vectors: {}", e)))?;

        let manifest = IndexManifest {
            format_version: INDEX_FORMAT_VERSION,
            dimensions: index.dimensions(),
            metric: index.metric(),
            entry_count: index.len(),
            documents: index.documents().to_vec(),
            checksum: sha256_hex(&vectors),
            created_at: Utc::now(),
        };
        let manifest_json = serde_json::to_vec_pretty(&manifest)?;

        let staging = self.staging_dir()?;
        let written = write_file(&staging.join(VECTORS_FILE), &vectors)
            .and_then(|_| write_file(&staging.join(MANIFEST_FILE), &manifest_json))
            .and_then(|_| self.swap_in(&staging));

        if let Err(e) = written {
            let _ = fs::remove_dir_all(&staging);
            return Err(Error::index_io(format!(
                "Failed to persist index to {}: {}",
                self.dir.display(),
                e
            )));
        }

        tracing::info!(
            "Persisted {} vectors ({} documents) to {}",
            manifest.entry_count,
            manifest.documents.len(),
            self.dir.display()
        );
        Ok(manifest)
    }

    /// Fresh temporary directory next to the target, so the final rename stays on one filesystem
    fn staging_dir(&self) -> Result<PathBuf> {
        let parent = match self.dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let name = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "index".to_string());
        let staging = parent.join(format!(".{}.tmp-{}", name, uuid::Uuid::new_v4().simple()));
        fs::create_dir(&staging)?;
        Ok(staging)
    }

    fn swap_in(&self, staging: &Path) -> std::io::Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::rename(staging, &self.dir)
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::index_io(format!("Failed to read {}: {}", path.display(), e))),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
