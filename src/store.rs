//! Vector store contract and the closed payload schema it stores
//!
//! Payloads and delete filters are typed rather than free-form maps, so a
//! filter on an unknown field cannot be expressed.

use crate::chunker::CodeChunk;
use crate::error::{RagError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identifier of a stored chunk
pub type PointId = u64;

/// Metadata stored next to each vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    pub file_path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub indexed_at: DateTime<Utc>,
}

/// A vector plus its payload, ready for upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPoint {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

impl StoredPoint {
    /// Build a point for a chunk, stamping the current time
    pub fn from_chunk(chunk: CodeChunk, vector: Vec<f32>) -> Self {
        Self {
            id: point_id(&chunk.file_path, chunk.start_line, chunk.end_line),
            vector,
            payload: PointPayload {
                file_path: chunk.file_path,
                content: chunk.content,
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                language: chunk.language,
                indexed_at: Utc::now(),
            },
        }
    }
}

/// Which points a delete applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointFilter {
    /// Every chunk of one file, whatever its line range
    FilePath(String),
}

impl PointFilter {
    pub fn matches(&self, payload: &PointPayload) -> bool {
        match self {
            Self::FilePath(path) => payload.file_path == *path,
        }
    }
}

/// One similarity-search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: PointId,
    /// Similarity score (higher is better)
    pub score: f32,
    pub file_path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
}

impl SearchHit {
    pub fn from_payload(id: PointId, score: f32, payload: &PointPayload) -> Self {
        Self {
            id,
            score,
            file_path: payload.file_path.clone(),
            content: payload.content.clone(),
            start_line: payload.start_line,
            end_line: payload.end_line,
            language: payload.language.clone(),
        }
    }
}

/// Size and shape of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub points_count: usize,
    pub vector_dimension: usize,
}

/// Storage backend for chunk vectors
pub trait VectorStore: Send + Sync {
    /// Create an empty collection
    fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// Insert or replace points by id
    fn upsert(&self, collection: &str, points: Vec<StoredPoint>) -> Result<()>;

    /// Nearest points with score >= `min_score`, best first
    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchHit>>;

    /// Remove every point matching `filter`
    fn delete(&self, collection: &str, filter: &PointFilter) -> Result<()>;

    fn collection_info(&self, collection: &str) -> Result<CollectionInfo>;

    /// Create the collection unless it exists with the same dimension
    fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        match self.collection_info(name) {
            Ok(info) if info.vector_dimension == dimension => Ok(()),
            Ok(info) => Err(RagError::DimensionMismatch {
                expected: info.vector_dimension,
                actual: dimension,
            }),
            Err(RagError::CollectionNotFound(_)) => self.create_collection(name, dimension),
            Err(e) => Err(e),
        }
    }
}

/// Deterministic id for a chunk location
///
/// Re-storing the same file range replaces the earlier point instead of
/// duplicating it, which keeps a resumed batch idempotent.
pub fn point_id(file_path: &str, start_line: usize, end_line: usize) -> PointId {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}-{}", file_path, start_line, end_line).as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
