//! Embedding service contract and a local fastembed implementation
//!
//! The pipeline only relies on [`EmbeddingService`]; [`LocalEmbedder`]
//! generates vectors entirely locally via the ONNX runtime. Models are
//! downloaded once and cached in ~/.cache/huggingface/

use crate::chunker::CodeChunk;
use crate::config::EmbeddingModel;
use crate::error::{RagError, Result};
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};
use std::path::Path;
use tracing::info;

/// Turns text into fixed-dimension vectors
///
/// `embed_batch` is order-preserving and atomic: it returns one vector per
/// input or fails for the whole batch.
pub trait EmbeddingService: Send + Sync {
    /// Embed a single text string
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed multiple texts in one call
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Length of every produced vector
    fn dimension(&self) -> usize;
}

/// Local embedder using fastembed with ONNX runtime
pub struct LocalEmbedder {
    model: TextEmbedding,
    dimension: usize,
}

impl LocalEmbedder {
    /// Create a new embedder with the specified model
    ///
    /// On first use, downloads the model from HuggingFace (~30-470MB).
    /// Subsequent uses load from cache instantly.
    pub fn new(model_config: EmbeddingModel) -> Result<Self> {
        info!("Loading embedding model: {:?}", model_config);

        let fastembed_model = match model_config {
            EmbeddingModel::AllMiniLmL6V2 => FastEmbedModel::AllMiniLML6V2,
            EmbeddingModel::BgeSmallEnV15 => FastEmbedModel::BGESmallENV15,
            EmbeddingModel::NomicEmbedTextV15 => FastEmbedModel::NomicEmbedTextV15,
            EmbeddingModel::MultilingualE5Small => FastEmbedModel::MultilingualE5Small,
        };

        let model = TextEmbedding::try_new(
            InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| RagError::Embedding(e.to_string()))?;

        let dimension = model_config.dimension();
        info!("Model loaded successfully (dimension: {})", dimension);

        Ok(Self { model, dimension })
    }
}

impl EmbeddingService for LocalEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self
            .model
            .embed(vec![text], None)
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("No embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let embeddings = self
            .model
            .embed(refs, None)
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        check_batch_len(texts.len(), embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Reject a batch response that does not line up with its inputs
pub(crate) fn check_batch_len(expected: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(RagError::Embedding(format!(
            "Expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }
    Ok(vectors)
}

/// Text sent to the embedding model for a chunk
///
/// The file name and language give the model context the raw lines lack.
pub fn embedding_text(chunk: &CodeChunk) -> String {
    let file_name = Path::new(&chunk.file_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| chunk.file_path.clone());

    format!(
        "File: {}\nLanguage: {}\nCode:\n{}",
        file_name, chunk.language, chunk.content
    )
}
