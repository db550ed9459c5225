//! Test doubles for the embedding service and vector store

use crate::embedder::EmbeddingService;
use crate::error::{RagError, Result};
use crate::store::{CollectionInfo, PointFilter, PointId, SearchHit, StoredPoint, VectorStore};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Deterministic embedder that counts calls and can fail on demand
pub struct FakeEmbedder {
    dimension: usize,
    batch_calls: AtomicUsize,
    /// 1-based batch call numbers that fail
    failing_calls: Mutex<HashSet<usize>>,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            batch_calls: AtomicUsize::new(0),
            failing_calls: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_on_call(&self, call: usize) {
        self.failing_calls.lock().unwrap().insert(call);
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dimension] += f32::from(byte) / 255.0;
        }
        vector
    }
}

impl EmbeddingService for FakeEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_calls.lock().unwrap().contains(&call) {
            return Err(RagError::Embedding(format!("scripted failure on call {}", call)));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// In-memory store recording every call it receives
///
/// `upserts` keeps the call history; `live` holds what is currently stored,
/// with deletes applied.
#[derive(Default)]
pub struct RecordingStore {
    pub collections: Mutex<HashMap<String, usize>>,
    pub live: Mutex<BTreeMap<PointId, StoredPoint>>,
    pub upserts: Mutex<Vec<Vec<StoredPoint>>>,
    pub deletes: Mutex<Vec<PointFilter>>,
    pub search_results: Mutex<Vec<SearchHit>>,
    pub fail_upserts: Mutex<bool>,
    pub failing_deletes: Mutex<HashSet<String>>,
    pub info_calls: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.lock().unwrap().len()
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }

    /// Calls of any kind, reads included
    pub fn total_calls(&self) -> usize {
        self.upsert_calls() + self.delete_calls() + self.info_calls.load(Ordering::SeqCst)
    }

    /// Every point ever upserted, in call order
    pub fn stored_points(&self) -> Vec<StoredPoint> {
        self.upserts.lock().unwrap().iter().flatten().cloned().collect()
    }

    /// Points currently stored for `file`
    pub fn live_points(&self, file: &str) -> Vec<StoredPoint> {
        self.live
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.payload.file_path == file)
            .cloned()
            .collect()
    }
}

impl VectorStore for RecordingStore {
    fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.collections
            .lock()
            .unwrap()
            .insert(name.to_string(), dimension);
        Ok(())
    }

    fn upsert(&self, _collection: &str, points: Vec<StoredPoint>) -> Result<()> {
        if *self.fail_upserts.lock().unwrap() {
            return Err(RagError::Store("scripted upsert failure".to_string()));
        }
        let mut live = self.live.lock().unwrap();
        for point in &points {
            live.insert(point.id, point.clone());
        }
        self.upserts.lock().unwrap().push(points);
        Ok(())
    }

    fn search(
        &self,
        _collection: &str,
        _vector: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchHit>> {
        Ok(self
            .search_results
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.score >= min_score)
            .take(limit)
            .cloned()
            .collect())
    }

    fn delete(&self, _collection: &str, filter: &PointFilter) -> Result<()> {
        self.deletes.lock().unwrap().push(filter.clone());
        let PointFilter::FilePath(path) = filter;
        if self.failing_deletes.lock().unwrap().contains(path) {
            return Err(RagError::Store(format!("scripted delete failure for {}", path)));
        }
        self.live
            .lock()
            .unwrap()
            .retain(|_, point| !filter.matches(&point.payload));
        Ok(())
    }

    fn collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        let dimension = *self
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        let points_count = self.live.lock().unwrap().len();
        Ok(CollectionInfo {
            points_count,
            vector_dimension: dimension,
        })
    }
}
