//! Configuration types and constants for coderag
//!
//! Defines embedding models, indexing limits, and where on-disk state lives.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lines per chunk window
pub const DEFAULT_CHUNK_SIZE: usize = 50;
/// Lines shared between consecutive windows
pub const DEFAULT_CHUNK_OVERLAP: usize = 10;
/// Files larger than this are skipped, not truncated
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;
/// Files per pipeline batch (one state checkpoint per batch)
pub const DEFAULT_FILE_BATCH_SIZE: usize = 50;
/// Chunks per embedding call
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 100;
/// Pause between embedding calls
pub const DEFAULT_EMBED_PAUSE_MS: u64 = 100;

/// Marker file written by git hooks, relative to the working directory
pub const PENDING_MARKER_FILE: &str = ".code-rag-pending-reindex";

/// Extensions indexed when none are given explicitly
pub const DEFAULT_EXTENSIONS: &[&str] = &["go", "py", "js", "ts", "tf", "yaml", "yml", "md", "rs"];

/// Supported embedding models (all run locally via ONNX)
///
/// These models are downloaded on first use and cached locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EmbeddingModel {
    /// Fast, small model (384 dims, ~30MB)
    AllMiniLmL6V2,
    /// Higher quality (384 dims, ~90MB)
    BgeSmallEnV15,
    /// Best quality for code (768 dims, ~90MB)
    #[default]
    NomicEmbedTextV15,
    /// Multilingual support (384 dims, ~470MB)
    MultilingualE5Small,
}

impl EmbeddingModel {
    /// Get the HuggingFace model identifier
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "sentence-transformers/all-MiniLM-L6-v2",
            Self::BgeSmallEnV15 => "BAAI/bge-small-en-v1.5",
            Self::NomicEmbedTextV15 => "nomic-ai/nomic-embed-text-v1.5",
            Self::MultilingualE5Small => "intfloat/multilingual-e5-small",
        }
    }

    /// Get the embedding vector dimension
    pub fn dimension(&self) -> usize {
        match self {
            Self::AllMiniLmL6V2 | Self::BgeSmallEnV15 | Self::MultilingualE5Small => 384,
            Self::NomicEmbedTextV15 => 768,
        }
    }
}

impl std::str::FromStr for EmbeddingModel {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "minilm" | "all-minilm-l6-v2" => Ok(Self::AllMiniLmL6V2),
            "bge" | "bge-small" | "bge-small-en-v1.5" => Ok(Self::BgeSmallEnV15),
            "nomic" | "nomic-embed" | "nomic-embed-text-v1.5" | "default" => {
                Ok(Self::NomicEmbedTextV15)
            }
            "multilingual" | "e5" | "multilingual-e5-small" => Ok(Self::MultilingualE5Small),
            _ => Err(RagError::Config(format!(
                "Unknown model: {}. Valid options: minilm, bge, nomic, multilingual",
                s
            ))),
        }
    }
}

/// Configuration for indexing, reindexing and search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the service runs from (marker file lives here)
    pub work_dir: PathBuf,
    /// Directory holding progress state, vectors and config
    pub data_dir: PathBuf,
    /// Vector store collection holding all chunks
    pub collection_name: String,
    /// Embedding model to use
    pub model: EmbeddingModel,
    /// Extension allow-list, without leading dots
    pub extensions: Vec<String>,
    /// Chunk size in lines
    pub chunk_size: usize,
    /// Overlap between chunks in lines
    pub chunk_overlap: usize,
    /// Maximum file size to index (bytes)
    pub max_file_size: u64,
    /// Files per batch
    pub file_batch_size: usize,
    /// Chunks per embedding call
    pub embed_batch_size: usize,
    /// Pause between embedding calls in milliseconds
    pub embed_pause_ms: u64,
    /// Default number of search results
    pub top_k: usize,
    /// Default minimum similarity for search results
    pub min_score: f32,
    /// Number of parallel workers for reading and chunking
    pub workers: usize,
    /// Draw progress bars on the terminal
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            data_dir: PathBuf::from(".coderag"),
            collection_name: "code_embeddings".to_string(),
            model: EmbeddingModel::default(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            file_batch_size: DEFAULT_FILE_BATCH_SIZE,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            embed_pause_ms: DEFAULT_EMBED_PAUSE_MS,
            top_k: 5,
            min_score: 0.15,
            workers: num_cpus::get(),
            show_progress: true,
        }
    }
}

impl Config {
    /// Create a new config rooted at the given working directory
    pub fn new(work_dir: PathBuf) -> Self {
        let data_dir = work_dir.join(".coderag");
        Self {
            work_dir,
            data_dir,
            ..Default::default()
        }
    }

    /// Set the embedding model
    pub fn with_model(mut self, model: EmbeddingModel) -> Self {
        self.model = model;
        self
    }

    /// Set the collection name
    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    /// Set the extension allow-list (leading dots are accepted)
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    /// Set file and embedding batch sizes
    pub fn with_batch_sizes(mut self, files: usize, chunks: usize) -> Self {
        self.file_batch_size = files.max(1);
        self.embed_batch_size = chunks.max(1);
        self
    }

    /// Set the pause between embedding calls
    pub fn with_embed_pause_ms(mut self, millis: u64) -> Self {
        self.embed_pause_ms = millis;
        self
    }

    /// Enable or disable terminal progress bars
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Path to the persisted progress state
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("indexing_state.json")
    }

    /// Path to the content-hash manifest of stored files
    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join("file_manifest.json")
    }

    /// Directory holding the local vector store
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    /// Path to the pending-reindex marker written by git hooks
    pub fn marker_path(&self) -> PathBuf {
        self.work_dir.join(PENDING_MARKER_FILE)
    }

    /// Get path to the config file
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(self.config_path(), json)?;
        Ok(())
    }

    /// Load configuration from a data directory
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("config.json");
        if !config_path.exists() {
            return Err(RagError::Config(format!(
                "No config found at {}",
                config_path.display()
            )));
        }
        let json = std::fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Load the saved config for a working directory, or fall back to defaults
    pub fn load_or_default(work_dir: PathBuf) -> Result<Self> {
        let fresh = Self::new(work_dir);
        if fresh.config_path().exists() {
            Self::load(&fresh.data_dir)
        } else {
            Ok(fresh)
        }
    }
}

/// Strip a leading dot and lowercase an extension
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}
