//! Local vector store using usearch (HNSW algorithm)
//!
//! Each collection is one cosine-metric index plus a bincode metadata file
//! holding the payloads. Both are rewritten after every mutating call.

use crate::error::{RagError, Result};
use crate::store::{
    CollectionInfo, PointFilter, PointId, PointPayload, SearchHit, StoredPoint, VectorStore,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

const META_SUFFIX: &str = ".meta.bin";
const INDEX_SUFFIX: &str = ".usearch";

#[derive(Debug, Serialize, Deserialize)]
struct CollectionMeta {
    dimension: usize,
    points: HashMap<PointId, PointPayload>,
}

struct Collection {
    index: Index,
    meta: CollectionMeta,
}

/// Vector store persisted under a local directory
pub struct LocalVectorStore {
    dir: PathBuf,
    collections: Mutex<HashMap<String, Collection>>,
}

fn index_options(dimension: usize) -> IndexOptions {
    IndexOptions {
        dimensions: dimension,
        metric: MetricKind::Cos, // Cosine similarity
        quantization: ScalarKind::F32,
        connectivity: 16,     // M parameter for HNSW
        expansion_add: 128,   // ef_construction
        expansion_search: 64, // ef
        multi: false,
    }
}

fn store_err(e: impl std::fmt::Display) -> RagError {
    RagError::Store(e.to_string())
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| RagError::InvalidPath(path.display().to_string()))
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(RagError::Config(format!("Invalid collection name: {:?}", name)))
    }
}

impl LocalVectorStore {
    /// Open the store, loading every collection found in `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut collections = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(META_SUFFIX))
            else {
                continue;
            };

            let name = name.to_string();
            let collection = Self::load_collection(&dir, &name)?;
            info!(
                "Loaded collection {} ({} points)",
                name,
                collection.meta.points.len()
            );
            collections.insert(name, collection);
        }

        Ok(Self {
            dir,
            collections: Mutex::new(collections),
        })
    }

    fn load_collection(dir: &Path, name: &str) -> Result<Collection> {
        let meta_bytes = std::fs::read(dir.join(format!("{}{}", name, META_SUFFIX)))?;
        let meta: CollectionMeta = bincode::deserialize(&meta_bytes)?;

        let index = Index::new(&index_options(meta.dimension)).map_err(store_err)?;
        let index_path = dir.join(format!("{}{}", name, INDEX_SUFFIX));
        if index_path.exists() {
            index.load(path_str(&index_path)?).map_err(store_err)?;
        }

        Ok(Collection { index, meta })
    }

    fn save_collection(&self, name: &str, collection: &Collection) -> Result<()> {
        let index_path = self.dir.join(format!("{}{}", name, INDEX_SUFFIX));
        collection
            .index
            .save(path_str(&index_path)?)
            .map_err(store_err)?;

        let meta_bytes = bincode::serialize(&collection.meta)?;
        std::fs::write(self.dir.join(format!("{}{}", name, META_SUFFIX)), meta_bytes)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Collection>> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl VectorStore for LocalVectorStore {
    fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        validate_name(name)?;
        let mut collections = self.lock();
        if collections.contains_key(name) {
            return Err(RagError::Store(format!("Collection {} already exists", name)));
        }

        let collection = Collection {
            index: Index::new(&index_options(dimension)).map_err(store_err)?,
            meta: CollectionMeta {
                dimension,
                points: HashMap::new(),
            },
        };
        self.save_collection(name, &collection)?;
        collections.insert(name.to_string(), collection);

        info!("Created collection {} (dimension: {})", name, dimension);
        Ok(())
    }

    fn upsert(&self, collection: &str, points: Vec<StoredPoint>) -> Result<()> {
        let mut collections = self.lock();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        if let Some(bad) = points
            .iter()
            .find(|p| p.vector.len() != target.meta.dimension)
        {
            return Err(RagError::DimensionMismatch {
                expected: target.meta.dimension,
                actual: bad.vector.len(),
            });
        }

        let needed = target.index.size() + points.len();
        if needed > target.index.capacity() {
            target.index.reserve(needed).map_err(store_err)?;
        }

        for point in points {
            if target.meta.points.contains_key(&point.id) {
                target.index.remove(point.id).map_err(store_err)?;
            }
            target
                .index
                .add(point.id, point.vector.as_slice())
                .map_err(store_err)?;
            target.meta.points.insert(point.id, point.payload);
        }

        debug!("Collection {} now holds {} points", collection, target.meta.points.len());
        self.save_collection(collection, target)
    }

    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchHit>> {
        let collections = self.lock();
        let target = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        if vector.len() != target.meta.dimension {
            return Err(RagError::DimensionMismatch {
                expected: target.meta.dimension,
                actual: vector.len(),
            });
        }
        if target.index.size() == 0 || limit == 0 {
            return Ok(vec![]);
        }

        let matches = target.index.search(vector, limit).map_err(store_err)?;

        let mut hits: Vec<SearchHit> = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(key, distance)| {
                // Cosine distance -> similarity
                let score = 1.0 - distance;
                let payload = target.meta.points.get(key)?;
                (score >= min_score).then(|| SearchHit::from_payload(*key, score, payload))
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(hits)
    }

    fn delete(&self, collection: &str, filter: &PointFilter) -> Result<()> {
        let mut collections = self.lock();
        let Some(target) = collections.get_mut(collection) else {
            return Ok(());
        };

        let removed: Vec<PointId> = target
            .meta
            .points
            .iter()
            .filter(|(_, payload)| filter.matches(payload))
            .map(|(id, _)| *id)
            .collect();

        if removed.is_empty() {
            return Ok(());
        }

        for id in &removed {
            target.index.remove(*id).map_err(store_err)?;
            target.meta.points.remove(id);
        }

        debug!("Removed {} points matching {:?}", removed.len(), filter);
        self.save_collection(collection, target)
    }

    fn collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        let collections = self.lock();
        let target = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        Ok(CollectionInfo {
            points_count: target.meta.points.len(),
            vector_dimension: target.meta.dimension,
        })
    }
}
