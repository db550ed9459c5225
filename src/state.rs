//! Persisted, resumable record of indexing progress
//!
//! A `ProgressState` is owned by one pipeline run and shared through an
//! `Arc` with anything that wants to report progress. Every read and write
//! goes through the internal lock; the on-disk copy is a full JSON document
//! rewritten after each batch.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Lifecycle of an indexing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    InProgress,
    Completed,
    Failed,
}

impl IndexStatus {
    /// Completed and failed runs never change status again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Serializable snapshot of a run's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub root_path: PathBuf,
    pub total_files: usize,
    pub indexed_files: usize,
    pub total_chunks: usize,
    pub processed_files: BTreeSet<String>,
    /// file -> error message
    pub failed_files: BTreeMap<String, String>,
    pub status: IndexStatus,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    fn new(root_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            root_path,
            total_files: 0,
            indexed_files: 0,
            total_chunks: 0,
            processed_files: BTreeSet::new(),
            failed_files: BTreeMap::new(),
            status: IndexStatus::InProgress,
            start_time: now,
            last_update: now,
            completion_time: None,
        }
    }

    /// Read a state file without attaching it to a run
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Percentage of files indexed, 0 when nothing was collected
    pub fn progress_percent(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        self.indexed_files as f64 / self.total_files as f64 * 100.0
    }

    /// Wall time of a finished run
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completion_time.map(|done| done - self.start_time)
    }
}

/// Lock-guarded progress of one indexing run
#[derive(Debug)]
pub struct ProgressState {
    inner: RwLock<ProgressRecord>,
}

impl ProgressState {
    /// Fresh in-progress state for `root_path`
    pub fn new(root_path: PathBuf) -> Self {
        Self::from_record(ProgressRecord::new(root_path))
    }

    pub fn from_record(record: ProgressRecord) -> Self {
        Self {
            inner: RwLock::new(record),
        }
    }

    /// Load the persisted state if it can be resumed for `root_path`
    ///
    /// A missing or unreadable file, a different root, or a completed run all
    /// yield a fresh state; prior progress is discarded, never merged. A failed
    /// run is reopened as in progress with its processed files kept.
    /// Returns the state and whether it was resumed.
    pub fn resume_or_new(state_path: &Path, root_path: &Path) -> (Self, bool) {
        match ProgressRecord::load(state_path) {
            Ok(mut record)
                if record.root_path == root_path && record.status != IndexStatus::Completed =>
            {
                if record.status == IndexStatus::Failed {
                    record.status = IndexStatus::InProgress;
                    record.completion_time = None;
                }
                (Self::from_record(record), true)
            }
            Ok(_) => (Self::new(root_path.to_path_buf()), false),
            Err(e) => {
                if state_path.exists() {
                    warn!("Ignoring unreadable state file {:?}: {}", state_path, e);
                }
                (Self::new(root_path.to_path_buf()), false)
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ProgressRecord> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ProgressRecord> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist the whole record, replacing the previous file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&*self.read())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Record a successfully chunked file
    pub fn mark_processed(&self, file: &str, chunks: usize) {
        let mut record = self.write();
        record.failed_files.remove(file);
        if record.processed_files.insert(file.to_string()) {
            record.indexed_files += 1;
            record.total_chunks += chunks;
        }
        record.last_update = Utc::now();
    }

    /// Record a file that could not be chunked
    pub fn mark_failed(&self, file: &str, error: &str) {
        let mut record = self.write();
        if record.processed_files.contains(file) {
            return;
        }
        record.failed_files.insert(file.to_string(), error.to_string());
        record.last_update = Utc::now();
    }

    pub fn is_processed(&self, file: &str) -> bool {
        self.read().processed_files.contains(file)
    }

    pub fn set_total_files(&self, total: usize) {
        let mut record = self.write();
        record.total_files = total;
        record.last_update = Utc::now();
    }

    /// Move to `status`; returns false if the run already reached a terminal status
    pub fn set_status(&self, status: IndexStatus) -> bool {
        let mut record = self.write();
        if record.status.is_terminal() {
            if record.status != status {
                warn!("Refusing status change {} -> {}", record.status, status);
            }
            return false;
        }

        let now = Utc::now();
        record.status = status;
        record.last_update = now;
        if status.is_terminal() {
            record.completion_time = Some(now);
        }
        true
    }

    pub fn status(&self) -> IndexStatus {
        self.read().status
    }

    pub fn indexed_files(&self) -> usize {
        self.read().indexed_files
    }

    pub fn progress_percent(&self) -> f64 {
        self.read().progress_percent()
    }

    /// Clone of the current record
    pub fn snapshot(&self) -> ProgressRecord {
        self.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_mark_processed_counts_once() {
        let state = ProgressState::new(PathBuf::from("/repo"));
        state.mark_processed("/repo/a.go", 3);
        state.mark_processed("/repo/a.go", 3);
        state.mark_processed("/repo/b.go", 0);

        let record = state.snapshot();
        assert_eq!(record.indexed_files, 2);
        assert_eq!(record.total_chunks, 3);
        assert!(state.is_processed("/repo/b.go"));
    }

    #[test]
    fn test_failed_and_processed_are_exclusive() {
        let state = ProgressState::new(PathBuf::from("/repo"));
        state.mark_failed("/repo/a.go", "invalid utf-8");
        assert_eq!(state.snapshot().failed_files.len(), 1);

        state.mark_processed("/repo/a.go", 2);
        state.mark_failed("/repo/a.go", "late failure");

        let record = state.snapshot();
        assert!(record.failed_files.is_empty());
        assert!(record.processed_files.contains("/repo/a.go"));
    }

    #[test]
    fn test_terminal_status_is_final() {
        let state = ProgressState::new(PathBuf::from("/repo"));
        assert!(state.set_status(IndexStatus::Completed));
        assert!(state.snapshot().completion_time.is_some());
        assert!(!state.set_status(IndexStatus::InProgress));
        assert!(!state.set_status(IndexStatus::Failed));
        assert_eq!(state.status(), IndexStatus::Completed);
    }

    #[test]
    fn test_progress_percent() {
        let state = ProgressState::new(PathBuf::from("/repo"));
        assert_eq!(state.progress_percent(), 0.0);
        state.set_total_files(4);
        state.mark_processed("a", 1);
        assert!((state.progress_percent() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_save_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("indexing_state.json");
        let root = PathBuf::from("/repo");

        let state = ProgressState::new(root.clone());
        state.mark_processed("/repo/a.go", 2);
        state.save(&path).unwrap();

        let (resumed, was_resumed) = ProgressState::resume_or_new(&path, &root);
        assert!(was_resumed);
        assert!(resumed.is_processed("/repo/a.go"));
        assert_eq!(resumed.snapshot().status, IndexStatus::InProgress);
    }

    #[test]
    fn test_resume_rejects_other_root_and_completed_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexing_state.json");

        let state = ProgressState::new(PathBuf::from("/repo"));
        state.mark_processed("/repo/a.go", 2);
        state.save(&path).unwrap();

        let (fresh, resumed) = ProgressState::resume_or_new(&path, Path::new("/other"));
        assert!(!resumed);
        assert_eq!(fresh.indexed_files(), 0);

        state.set_status(IndexStatus::Completed);
        state.save(&path).unwrap();
        let (fresh, resumed) = ProgressState::resume_or_new(&path, Path::new("/repo"));
        assert!(!resumed);
        assert!(!fresh.is_processed("/repo/a.go"));
    }

    #[test]
    fn test_failed_run_is_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexing_state.json");

        let state = ProgressState::new(PathBuf::from("/repo"));
        state.mark_processed("/repo/a.go", 1);
        state.set_status(IndexStatus::Failed);
        state.save(&path).unwrap();

        let (reopened, resumed) = ProgressState::resume_or_new(&path, Path::new("/repo"));
        assert!(resumed);
        assert!(reopened.is_processed("/repo/a.go"));
        assert_eq!(reopened.status(), IndexStatus::InProgress);
        assert!(reopened.set_status(IndexStatus::Completed));
    }

    #[test]
    fn test_corrupt_state_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexing_state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let (state, resumed) = ProgressState::resume_or_new(&path, Path::new("/repo"));
        assert!(!resumed);
        assert_eq!(state.status(), IndexStatus::InProgress);
    }

    #[test]
    fn test_state_file_uses_snake_case_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexing_state.json");
        ProgressState::new(PathBuf::from("/repo")).save(&path).unwrap();

        let json = std::fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"status\": \"in_progress\""));
    }

    #[test]
    fn test_concurrent_readers_during_writes() {
        let state = Arc::new(ProgressState::new(PathBuf::from("/repo")));
        state.set_total_files(200);

        let writer = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                for i in 0..200 {
                    state.mark_processed(&format!("file-{}", i), 1);
                }
            })
        };

        for _ in 0..50 {
            let record = state.snapshot();
            assert_eq!(record.indexed_files, record.processed_files.len());
        }

        writer.join().unwrap();
        assert_eq!(state.indexed_files(), 200);
    }
}
