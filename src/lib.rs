//! # coderag - Resumable incremental code indexing
//!
//! Walks a source tree, splits files into overlapping line windows, embeds
//! them and keeps a vector store in sync for semantic code search.
//!
//! ## Features
//!
//! - **Resumable**: progress is checkpointed after every batch; an interrupted
//!   run continues where it stopped
//! - **Incremental**: unchanged files are skipped by content hash, changed
//!   files are rebuilt, and git hooks can request targeted reindexing
//! - **Local**: embeddings via fastembed (ONNX) and a usearch-backed store
//! - **Watch Mode**: reindexes files as they change
//!
//! ## Example
//!
//! ```no_run
//! use coderag::{
//!     CancellationFlag, Config, HitFilter, IndexingPipeline, LocalEmbedder,
//!     LocalVectorStore, Searcher,
//! };
//! use std::path::{Path, PathBuf};
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::new(PathBuf::from("."));
//!     let embedder = Arc::new(LocalEmbedder::new(config.model)?);
//!     let store = Arc::new(LocalVectorStore::open(config.store_dir())?);
//!
//!     // Build or resume the index
//!     let pipeline = IndexingPipeline::new(config.clone(), embedder.clone(), store.clone())?;
//!     pipeline.index_directory(Path::new("."), &CancellationFlag::new())?;
//!
//!     // Search
//!     let searcher = Searcher::new(embedder, store, config.collection_name.clone());
//!     for hit in searcher.search("authentication handler", 10, 0.15, &HitFilter::new())? {
//!         println!("{}:{} (score: {:.2})", hit.file_path, hit.start_line, hit.score);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod chunker;
pub mod collector;
pub mod config;
pub mod dedup;
pub mod embedder;
pub mod error;
pub mod filter;
pub mod local_store;
pub mod manifest;
pub mod pipeline;
pub mod reindex;
pub mod searcher;
pub mod state;
pub mod store;
pub mod watcher;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use chunker::{Chunker, CodeChunk};
pub use collector::FileCollector;
pub use config::{Config, EmbeddingModel};
pub use dedup::deduplicate;
pub use embedder::{EmbeddingService, LocalEmbedder};
pub use error::{RagError, Result};
pub use filter::HitFilter;
pub use local_store::LocalVectorStore;
pub use pipeline::{CancellationFlag, IndexingPipeline, RunOutcome};
pub use reindex::{PendingMarker, ReindexCoordinator, ReindexReport};
pub use searcher::{format_results, format_results_json, Searcher};
pub use state::{IndexStatus, ProgressRecord, ProgressState};
pub use store::{CollectionInfo, PointFilter, SearchHit, VectorStore};
pub use watcher::IndexWatcher;
