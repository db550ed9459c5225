//! Custom error types for coderag
//!
//! Uses thiserror for ergonomic error definitions with automatic
//! Display and Error trait implementations.

use thiserror::Error;

/// Application-specific errors for coderag
#[derive(Error, Debug)]
pub enum RagError {
    /// IO operations failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory traversal failed (permissions, broken links)
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Embedding model failed to load or embed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector store operations failed
    #[error("Store error: {0}")]
    Store(String),

    /// The requested collection does not exist in the store
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Vector length disagrees with the collection
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON parsing failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid filter pattern
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// Invalid file or directory path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// File watcher errors
    #[error("Watch error: {0}")]
    Watch(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, RagError>;
