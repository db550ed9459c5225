//! Line-window chunking for embedding
//!
//! Splits source files into fixed-size, overlapping line windows.
//! Preserves line number information for search result display.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A contiguous slice of one file, the unit of embedding and storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChunk {
    /// Source file path
    pub file_path: String,
    /// The text content
    pub content: String,
    /// Starting line number (1-indexed, inclusive)
    pub start_line: usize,
    /// Ending line number (1-indexed, inclusive)
    pub end_line: usize,
    /// Language tag derived from the file extension
    pub language: String,
}

/// Splits text into overlapping line windows
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a new chunker
    ///
    /// # Arguments
    /// * `chunk_size` - Lines per window
    /// * `overlap` - Lines shared with the previous window
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Read a file from disk and chunk it
    ///
    /// Read errors (missing file, invalid UTF-8) are returned to the caller.
    pub fn chunk_file(&self, path: &Path) -> Result<Vec<CodeChunk>> {
        let text = std::fs::read_to_string(path)?;
        Ok(self.chunk_text(&text, &path.to_string_lossy()))
    }

    /// Split text into chunks
    ///
    /// Windows whose content is blank are dropped. The loop stops after the
    /// window that reaches the last line, so the final chunk may be short.
    pub fn chunk_text(&self, text: &str, file_path: &str) -> Vec<CodeChunk> {
        let lines: Vec<&str> = text.lines().collect();
        if lines.is_empty() {
            return vec![];
        }

        let language = detect_language(file_path);
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(lines.len());
            let content = lines[start..end].join("\n");

            if !content.trim().is_empty() {
                chunks.push(CodeChunk {
                    file_path: file_path.to_string(),
                    content,
                    start_line: start + 1,
                    end_line: end,
                    language: language.to_string(),
                });
            }

            if end == lines.len() {
                break;
            }
            start += self.stride();
        }

        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_CHUNK_SIZE,
            crate::config::DEFAULT_CHUNK_OVERLAP,
        )
    }
}

/// Detect programming language from file extension
pub fn detect_language(file_path: &str) -> &'static str {
    let ext = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match ext.as_deref() {
        Some("go") => "go",
        Some("rs") => "rust",
        Some("py" | "pyi" | "pyw") => "python",
        Some("js" | "mjs" | "cjs" | "jsx") => "javascript",
        Some("ts" | "mts" | "cts" | "tsx") => "typescript",
        Some("java") => "java",
        Some("kt" | "kts") => "kotlin",
        Some("c" | "h") => "c",
        Some("cpp" | "hpp" | "cc" | "cxx" | "hxx") => "cpp",
        Some("cs") => "csharp",
        Some("rb") => "ruby",
        Some("php") => "php",
        Some("swift") => "swift",
        Some("sh" | "bash" | "zsh") => "bash",
        Some("sql") => "sql",
        Some("tf" | "hcl") => "terraform",
        Some("yaml" | "yml") => "yaml",
        Some("json") => "json",
        Some("toml") => "toml",
        Some("md" | "mdx") => "markdown",
        Some("html" | "htm") => "html",
        Some("css" | "scss") => "css",
        _ => "unknown",
    }
}
