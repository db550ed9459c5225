//! Resumable batch indexing
//!
//! Collects files, chunks them in fixed-size batches, embeds and stores the
//! chunks, and checkpoints progress after every batch. An interrupted run
//! picks up where it stopped; files already marked processed are never
//! redone.

use crate::chunker::{Chunker, CodeChunk};
use crate::collector::FileCollector;
use crate::config::Config;
use crate::embedder::{check_batch_len, embedding_text, EmbeddingService};
use crate::error::{RagError, Result};
use crate::manifest::{content_hash, FileFingerprint, FileManifest};
use crate::state::{IndexStatus, ProgressRecord, ProgressState};
use crate::store::{PointFilter, StoredPoint, VectorStore};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Cooperative cancellation signal, observed between batches
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How an indexing run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every candidate file was processed or recorded as failed
    Completed,
    /// Cancelled at a batch boundary; state was saved for resuming
    Interrupted,
}

/// Mutable bookkeeping of one run
struct Run {
    state: Arc<ProgressState>,
    manifest: FileManifest,
    collection_ready: bool,
}

/// Drives collection -> chunking -> embedding -> storage
pub struct IndexingPipeline {
    config: Config,
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn VectorStore>,
    chunker: Chunker,
    pool: rayon::ThreadPool,
    current: RwLock<Option<Arc<ProgressState>>>,
}

impl IndexingPipeline {
    /// Create a pipeline over the given collaborators
    pub fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingService>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .build()
            .map_err(|e| RagError::Config(e.to_string()))?;
        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap);

        Ok(Self {
            config,
            embedder,
            store,
            chunker,
            pool,
            current: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Index every candidate file under `root`, resuming a previous run if possible
    ///
    /// Per-file and per-batch failures are logged and recorded; only a failed
    /// file collection aborts the run (status `failed`).
    pub fn index_directory(&self, root: &Path, cancel: &CancellationFlag) -> Result<RunOutcome> {
        let root = normalize_path(root);
        let root = root.as_path();
        let state_path = self.config.state_path();
        let (state, resumed) = ProgressState::resume_or_new(&state_path, root);
        if resumed {
            info!(
                already_indexed = state.indexed_files(),
                progress = state.progress_percent(),
                "Resuming indexing session for {:?}",
                root
            );
        } else {
            info!("Starting new indexing session for {:?}", root);
        }

        let mut run = Run {
            state: Arc::new(state),
            manifest: FileManifest::load(&self.config.manifest_path()),
            collection_ready: false,
        };
        *self.current.write().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::clone(&run.state));

        let collector = FileCollector::new(&self.config.extensions, self.config.max_file_size);
        let all_files = match collector.collect(root) {
            Ok(files) => files,
            Err(e) => {
                error!("Failed to collect files under {:?}: {}", root, e);
                run.state.set_status(IndexStatus::Failed);
                self.checkpoint(&run);
                return Err(e);
            }
        };
        run.state.set_total_files(all_files.len());

        let current: HashSet<String> = all_files.iter().map(|p| path_key(p)).collect();
        let remaining: Vec<PathBuf> = all_files
            .into_iter()
            .filter(|p| !run.state.is_processed(&path_key(p)))
            .collect();
        info!(total = current.len(), remaining = remaining.len(), "Files to index");

        if remaining.is_empty() {
            self.finish(&mut run, root, &current);
            info!("Indexing already complete");
            return Ok(RunOutcome::Completed);
        }

        let pb = self.progress_bar(remaining.len());
        let batch_size = self.config.file_batch_size.max(1);

        for (i, batch) in remaining.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                info!("Indexing cancelled, saving state...");
                self.checkpoint(&run);
                pb.abandon_with_message("Indexing interrupted");
                return Ok(RunOutcome::Interrupted);
            }

            if let Err(e) = self.process_batch(&mut run, batch) {
                error!(
                    batch_start = i * batch_size,
                    batch_end = i * batch_size + batch.len(),
                    "Batch processing failed: {}",
                    e
                );
            }

            self.checkpoint(&run);
            pb.inc(batch.len() as u64);
            debug!(
                indexed = run.state.indexed_files(),
                progress = run.state.progress_percent(),
                "Progress update"
            );
        }

        pb.finish_with_message("Indexing complete");
        self.finish(&mut run, root, &current);

        let record = run.state.snapshot();
        info!(
            total_files = record.indexed_files,
            total_chunks = record.total_chunks,
            failed_files = record.failed_files.len(),
            stored_files = run.manifest.len(),
            "Indexing complete"
        );

        Ok(RunOutcome::Completed)
    }

    /// Read, chunk, embed and store one batch of files
    fn process_batch(&self, run: &mut Run, batch: &[PathBuf]) -> Result<usize> {
        let reads: Vec<(String, Result<String>)> = self.pool.install(|| {
            batch
                .par_iter()
                .map(|path| {
                    let content = std::fs::read_to_string(path).map_err(RagError::from);
                    (path_key(path), content)
                })
                .collect()
        });

        let mut chunks: Vec<CodeChunk> = Vec::new();
        let mut fingerprints: Vec<(String, FileFingerprint)> = Vec::new();

        for (file, content) in reads {
            let content = match content {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %file, "Failed to chunk file: {}", e);
                    run.state.mark_failed(&file, &e.to_string());
                    // Chunks of an earlier readable version must not outlive it
                    if run.manifest.remove(&file).is_some() {
                        self.delete_file(&file);
                    }
                    continue;
                }
            };

            let hash = content_hash(&content);
            match run.manifest.get(&file) {
                Some(previous) if previous.hash == hash => {
                    debug!("Skipping unchanged file: {}", file);
                    run.state.mark_processed(&file, previous.chunks);
                    continue;
                }
                // Line ranges may have shifted; drop every old chunk first
                Some(_) => self.delete_file(&file),
                None => {}
            }

            let file_chunks = self.chunker.chunk_text(&content, &file);
            run.state.mark_processed(&file, file_chunks.len());
            fingerprints.push((
                file,
                FileFingerprint {
                    hash,
                    chunks: file_chunks.len(),
                },
            ));
            chunks.extend(file_chunks);
        }

        let stored = if chunks.is_empty() {
            0
        } else {
            if !run.collection_ready {
                self.store
                    .ensure_collection(&self.config.collection_name, self.embedder.dimension())?;
                run.collection_ready = true;
            }
            self.store_chunks(&chunks)?
        };

        for (file, fingerprint) in fingerprints {
            run.manifest.record(file, fingerprint);
        }
        Ok(stored)
    }

    /// Embed chunks in sub-batches, pausing between embedding calls
    fn store_chunks(&self, chunks: &[CodeChunk]) -> Result<usize> {
        let size = self.config.embed_batch_size.max(1);
        let sub_batches = chunks.len().div_ceil(size);

        for (i, sub_batch) in chunks.chunks(size).enumerate() {
            embed_and_upsert(
                self.embedder.as_ref(),
                self.store.as_ref(),
                &self.config.collection_name,
                sub_batch,
            )?;

            if i + 1 < sub_batches && self.config.embed_pause_ms > 0 {
                std::thread::sleep(Duration::from_millis(self.config.embed_pause_ms));
            }
        }

        Ok(chunks.len())
    }

    fn delete_file(&self, file: &str) {
        let filter = PointFilter::FilePath(file.to_string());
        if let Err(e) = self.store.delete(&self.config.collection_name, &filter) {
            warn!(file = %file, "Failed to delete old chunks: {}", e);
        }
    }

    /// Purge files that disappeared since the last run, then mark completion
    fn finish(&self, run: &mut Run, root: &Path, current: &HashSet<String>) {
        for stale in run.manifest.stale_under(root, current) {
            let filter = PointFilter::FilePath(stale.clone());
            match self.store.delete(&self.config.collection_name, &filter) {
                Ok(()) => {
                    debug!("Removed chunks of deleted file {}", stale);
                    run.manifest.remove(&stale);
                }
                Err(e) => warn!(file = %stale, "Failed to remove deleted file: {}", e),
            }
        }

        run.state.set_status(IndexStatus::Completed);
        self.checkpoint(run);
    }

    /// Persist state and manifest; failures only cost resumability
    fn checkpoint(&self, run: &Run) {
        if let Err(e) = run.state.save(&self.config.state_path()) {
            warn!("Failed to save state: {}", e);
        }
        if let Err(e) = run.manifest.save(&self.config.manifest_path()) {
            warn!("Failed to save manifest: {}", e);
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files indexed")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        pb
    }

    /// Handle to the state of the current (or last) run
    pub fn state(&self) -> Option<Arc<ProgressState>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Progress of the current run, or of the last persisted one
    pub fn progress(&self) -> Option<ProgressRecord> {
        match self.state() {
            Some(state) => Some(state.snapshot()),
            None => ProgressRecord::load(&self.config.state_path()).ok(),
        }
    }

    /// Forget all progress so the next run starts from scratch
    pub fn reset_state(&self) -> Result<()> {
        for path in [self.config.state_path(), self.config.manifest_path()] {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Embed one group of chunks and upsert the resulting points
pub(crate) fn embed_and_upsert(
    embedder: &dyn EmbeddingService,
    store: &dyn VectorStore,
    collection: &str,
    chunks: &[CodeChunk],
) -> Result<usize> {
    if chunks.is_empty() {
        return Ok(0);
    }

    let texts: Vec<String> = chunks.iter().map(embedding_text).collect();
    let vectors = check_batch_len(texts.len(), embedder.embed_batch(&texts)?)?;

    let points: Vec<StoredPoint> = chunks
        .iter()
        .cloned()
        .zip(vectors)
        .map(|(chunk, vector)| StoredPoint::from_chunk(chunk, vector))
        .collect();

    let count = points.len();
    store.upsert(collection, points)?;
    debug!("Stored {} chunks in {}", count, collection);
    Ok(count)
}

/// Key identifying a file in progress state and payloads
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Absolute, symlink-free form of `path`, so every entry point derives the same key
///
/// A file that no longer exists keeps its name under its canonical parent;
/// if the parent is gone too, the path is returned unchanged.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            match parent.canonicalize() {
                Ok(parent) => parent.join(name),
                Err(_) => path.to_path_buf(),
            }
        }
        _ => path.to_path_buf(),
    }
}
