//! Targeted delete-and-rebuild for a known set of files
//!
//! Used for incremental updates: git hooks drop a pending marker listing
//! changed files, and the watcher feeds debounced change events.

use crate::chunker::{Chunker, CodeChunk};
use crate::config::{Config, PENDING_MARKER_FILE};
use crate::embedder::EmbeddingService;
use crate::error::Result;
use crate::manifest::{content_hash, FileFingerprint, FileManifest};
use crate::pipeline::{embed_and_upsert, normalize_path, path_key};
use crate::store::{PointFilter, VectorStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a reindex request did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    /// Paths in the request
    pub requested: usize,
    /// Paths whose old chunks were deleted
    pub deleted: usize,
    /// Paths gone from disk (deletion only)
    pub missing: usize,
    /// Paths re-chunked from disk
    pub reindexed_files: usize,
    /// Chunks embedded and stored
    pub chunks: usize,
    /// Paths whose delete failed, with the error
    pub delete_failures: Vec<(String, String)>,
    /// Paths that could not be re-chunked, with the error
    pub chunk_failures: Vec<(String, String)>,
}

/// Refreshes the stored representation of individual files
pub struct ReindexCoordinator {
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn VectorStore>,
    chunker: Chunker,
    collection: String,
    manifest_path: PathBuf,
}

impl ReindexCoordinator {
    pub fn new(
        config: &Config,
        embedder: Arc<dyn EmbeddingService>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            embedder,
            store,
            chunker: Chunker::new(config.chunk_size, config.chunk_overlap),
            collection: config.collection_name.clone(),
            manifest_path: config.manifest_path(),
        }
    }

    /// Delete and rebuild the chunks of every path in `files`
    ///
    /// Delete and chunking failures are per file and only reported. All
    /// chunks go to the store in one combined batch at the end; a failure
    /// there fails the whole request. The file manifest follows the store:
    /// every requested entry is dropped up front and rebuilt files are
    /// recorded once their chunks are stored.
    pub fn reindex_files(&self, files: &[PathBuf]) -> Result<ReindexReport> {
        let mut report = ReindexReport {
            requested: files.len(),
            ..Default::default()
        };
        let mut chunks: Vec<CodeChunk> = Vec::new();
        let mut fingerprints: Vec<(String, FileFingerprint)> = Vec::new();
        let mut manifest = FileManifest::load(&self.manifest_path);

        for path in files {
            let path = normalize_path(path);
            let file = path_key(&path);
            manifest.remove(&file);

            let filter = PointFilter::FilePath(file.clone());
            match self.store.delete(&self.collection, &filter) {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    warn!(file = %file, "Failed to delete old chunks: {}", e);
                    report.delete_failures.push((file.clone(), e.to_string()));
                }
            }

            if !path.exists() {
                debug!("File removed, skipping re-chunk: {}", file);
                report.missing += 1;
                continue;
            }

            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    let file_chunks = self.chunker.chunk_text(&content, &file);
                    report.reindexed_files += 1;
                    fingerprints.push((
                        file,
                        FileFingerprint {
                            hash: content_hash(&content),
                            chunks: file_chunks.len(),
                        },
                    ));
                    chunks.extend(file_chunks);
                }
                Err(e) => {
                    warn!(file = %file, "Failed to chunk file: {}", e);
                    report.chunk_failures.push((file, e.to_string()));
                }
            }
        }

        // Removals hold even if the combined upsert below fails
        self.save_manifest(&manifest);

        if !chunks.is_empty() {
            self.store
                .ensure_collection(&self.collection, self.embedder.dimension())?;
            report.chunks = embed_and_upsert(
                self.embedder.as_ref(),
                self.store.as_ref(),
                &self.collection,
                &chunks,
            )?;
        }

        if !fingerprints.is_empty() {
            for (file, fingerprint) in fingerprints {
                manifest.record(file, fingerprint);
            }
            self.save_manifest(&manifest);
        }

        info!(
            files = report.requested,
            chunks = report.chunks,
            "Reindexed files"
        );
        Ok(report)
    }

    fn save_manifest(&self, manifest: &FileManifest) {
        if let Err(e) = manifest.save(&self.manifest_path) {
            warn!("Failed to save manifest: {}", e);
        }
    }

    /// Reindex the files listed in the pending marker, clearing it on success
    ///
    /// Returns `None` when there is no marker. An empty marker is removed.
    pub fn reindex_from_marker(&self, marker: &PendingMarker) -> Result<Option<ReindexReport>> {
        let Some(files) = marker.read()? else {
            debug!("No pending reindex requests");
            return Ok(None);
        };

        if files.is_empty() {
            marker.clear()?;
            return Ok(None);
        }

        info!(file_count = files.len(), "Processing pending reindex from marker file");
        let report = self.reindex_files(&files)?;
        marker.clear()?;
        Ok(Some(report))
    }
}

/// Whitespace-separated list of paths awaiting reindex
#[derive(Debug, Clone)]
pub struct PendingMarker {
    path: PathBuf,
}

impl PendingMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Marker at its conventional name inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(PENDING_MARKER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Paths listed in the marker, or `None` if there is no marker
    pub fn read(&self) -> Result<Option<Vec<PathBuf>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(content.split_whitespace().map(PathBuf::from).collect()))
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEmbedder, RecordingStore};
    use std::fs;

    fn coordinator(
        work_dir: &Path,
        embedder: Arc<FakeEmbedder>,
        store: Arc<RecordingStore>,
    ) -> ReindexCoordinator {
        let config = Config::new(work_dir.to_path_buf());
        ReindexCoordinator::new(&config, embedder, store)
    }

    fn lines(n: usize) -> String {
        (1..=n).map(|i| format!("fn f{}() {{}}\n", i)).collect()
    }

    #[test]
    fn test_missing_file_is_only_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone.go");
        let embedder = Arc::new(FakeEmbedder::new(4));
        let store = Arc::new(RecordingStore::new());

        let report = coordinator(dir.path(), embedder.clone(), store.clone())
            .reindex_files(&[gone.clone()])
            .unwrap();

        assert_eq!(report.missing, 1);
        assert_eq!(report.chunks, 0);
        assert_eq!(
            *store.deletes.lock().unwrap(),
            vec![PointFilter::FilePath(path_key(&normalize_path(&gone)))]
        );
        assert_eq!(store.upsert_calls(), 0);
        assert_eq!(embedder.batch_calls(), 0);
    }

    #[test]
    fn test_all_chunks_go_in_one_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.go");
        let b = dir.path().join("b.py");
        fs::write(&a, lines(60)).unwrap();
        fs::write(&b, lines(5)).unwrap();
        let embedder = Arc::new(FakeEmbedder::new(4));
        let store = Arc::new(RecordingStore::new());

        let report = coordinator(dir.path(), embedder.clone(), store.clone())
            .reindex_files(&[a, b])
            .unwrap();

        assert_eq!(report.reindexed_files, 2);
        assert_eq!(report.chunks, 3);
        assert_eq!(store.delete_calls(), 2);
        assert_eq!(store.upsert_calls(), 1);
        assert_eq!(embedder.batch_calls(), 1);
    }

    #[test]
    fn test_delete_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.go");
        let b = dir.path().join("b.go");
        fs::write(&a, lines(3)).unwrap();
        fs::write(&b, lines(3)).unwrap();
        let store = Arc::new(RecordingStore::new());
        store.failing_deletes.lock().unwrap().insert(path_key(&normalize_path(&a)));

        let report = coordinator(dir.path(), Arc::new(FakeEmbedder::new(4)), store.clone())
            .reindex_files(&[a.clone(), b])
            .unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(report.delete_failures.len(), 1);
        assert_eq!(report.delete_failures[0].0, path_key(&normalize_path(&a)));
        assert_eq!(report.chunks, 2);
    }

    #[test]
    fn test_manifest_follows_reindexed_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.go");
        fs::write(&a, lines(3)).unwrap();
        let key = path_key(&normalize_path(&a));
        let config = Config::new(dir.path().to_path_buf());
        let coordinator = coordinator(dir.path(), Arc::new(FakeEmbedder::new(4)), Arc::new(RecordingStore::new()));

        coordinator.reindex_files(&[a.clone()]).unwrap();
        let recorded = FileManifest::load(&config.manifest_path());
        assert_eq!(recorded.get(&key).map(|f| f.hash.clone()), Some(content_hash(&lines(3))));

        fs::remove_file(&a).unwrap();
        coordinator.reindex_files(&[a]).unwrap();
        assert!(FileManifest::load(&config.manifest_path()).get(&key).is_none());
    }

    #[test]
    fn test_store_failure_fails_request() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.go");
        fs::write(&a, lines(3)).unwrap();
        let store = Arc::new(RecordingStore::new());
        *store.fail_upserts.lock().unwrap() = true;

        let result = coordinator(dir.path(), Arc::new(FakeEmbedder::new(4)), store).reindex_files(&[a]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unreadable_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.go");
        fs::write(&bad, [0xff, 0xfe, 0x00]).unwrap();

        let report = coordinator(dir.path(), Arc::new(FakeEmbedder::new(4)), Arc::new(RecordingStore::new()))
            .reindex_files(&[bad])
            .unwrap();

        assert_eq!(report.chunk_failures.len(), 1);
        assert_eq!(report.reindexed_files, 0);
    }

    #[test]
    fn test_marker_is_cleared_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.go");
        let b = dir.path().join("b.go");
        fs::write(&a, lines(3)).unwrap();
        fs::write(&b, lines(3)).unwrap();

        let marker = PendingMarker::in_dir(dir.path());
        fs::write(marker.path(), format!("{}\n {}  \n", a.display(), b.display())).unwrap();

        let store = Arc::new(RecordingStore::new());
        let report = coordinator(dir.path(), Arc::new(FakeEmbedder::new(4)), store.clone())
            .reindex_from_marker(&marker)
            .unwrap()
            .unwrap();

        assert_eq!(report.requested, 2);
        assert_eq!(store.upsert_calls(), 1);
        assert!(!marker.path().exists());
    }

    #[test]
    fn test_marker_kept_when_reindex_fails() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.go");
        fs::write(&a, lines(3)).unwrap();
        let marker = PendingMarker::in_dir(dir.path());
        fs::write(marker.path(), a.display().to_string()).unwrap();

        let store = Arc::new(RecordingStore::new());
        *store.fail_upserts.lock().unwrap() = true;

        let result = coordinator(dir.path(), Arc::new(FakeEmbedder::new(4)), store).reindex_from_marker(&marker);
        assert!(result.is_err());
        assert!(marker.path().exists());
    }

    #[test]
    fn test_absent_and_empty_markers() {
        let dir = tempfile::tempdir().unwrap();
        let marker = PendingMarker::in_dir(dir.path());
        let store = Arc::new(RecordingStore::new());
        let coordinator = coordinator(dir.path(), Arc::new(FakeEmbedder::new(4)), store.clone());

        assert!(coordinator.reindex_from_marker(&marker).unwrap().is_none());

        fs::write(marker.path(), "  \n").unwrap();
        assert!(coordinator.reindex_from_marker(&marker).unwrap().is_none());
        assert!(!marker.path().exists());
        assert_eq!(store.total_calls(), 0);
    }
}
