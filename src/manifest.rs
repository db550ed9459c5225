//! Content hashes of files whose chunks are known to be stored
//!
//! Survives across runs, unlike the progress state: a fresh run can skip
//! any file whose content hash still matches what was stored last time.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::warn;

/// What was stored for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// SHA-256 of the file content
    pub hash: String,
    /// Chunks stored for that content
    pub chunks: usize,
}

/// Map of file path -> fingerprint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileManifest {
    files: BTreeMap<String, FileFingerprint>,
}

impl FileManifest {
    /// Load the manifest, starting empty when missing or unreadable
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path)
            .map_err(crate::error::RagError::from)
            .and_then(|json| Ok(serde_json::from_str(&json)?))
        {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Ignoring unreadable manifest {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save manifest to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn get(&self, file: &str) -> Option<&FileFingerprint> {
        self.files.get(file)
    }

    pub fn record(&mut self, file: String, fingerprint: FileFingerprint) {
        self.files.insert(file, fingerprint);
    }

    pub fn remove(&mut self, file: &str) -> Option<FileFingerprint> {
        self.files.remove(file)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files recorded under `root` that are not in `current`
    pub fn stale_under(&self, root: &Path, current: &HashSet<String>) -> Vec<String> {
        self.files
            .keys()
            .filter(|file| Path::new(file).starts_with(root) && !current.contains(*file))
            .cloned()
            .collect()
    }
}

/// Compute SHA-256 hash of content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
