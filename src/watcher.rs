//! File system watcher for live index updates
//!
//! Debounces change events and hands the affected files to the
//! [`ReindexCoordinator`], so deleted files are purged and edited ones rebuilt.

use crate::collector::FileCollector;
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::pipeline::CancellationFlag;
use crate::reindex::ReindexCoordinator;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEBOUNCE: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

type EventResult = std::result::Result<Vec<DebouncedEvent>, notify::Error>;

/// Watches a directory tree and reindexes changed files
pub struct IndexWatcher {
    root: PathBuf,
    data_dir: PathBuf,
    collector: FileCollector,
    coordinator: ReindexCoordinator,
}

impl IndexWatcher {
    pub fn new(root: &Path, config: &Config, coordinator: ReindexCoordinator) -> Result<Self> {
        Ok(Self {
            root: root.canonicalize()?,
            data_dir: config.data_dir.clone(),
            collector: FileCollector::new(&config.extensions, config.max_file_size),
            coordinator,
        })
    }

    /// Watch until `cancel` is set
    pub fn watch(&self, cancel: &CancellationFlag) -> Result<()> {
        info!("Watching {:?} for changes...", self.root);

        let (tx, rx) = channel();
        let mut debouncer =
            new_debouncer(DEBOUNCE, tx).map_err(|e| RagError::Watch(e.to_string()))?;
        debouncer
            .watcher()
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| RagError::Watch(e.to_string()))?;

        self.process_events(rx, cancel)
    }

    fn process_events(&self, rx: Receiver<EventResult>, cancel: &CancellationFlag) -> Result<()> {
        while !cancel.is_cancelled() {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(events)) => {
                    let changed = self.relevant_paths(events.into_iter().map(|e| e.path));
                    if !changed.is_empty() {
                        self.handle_changes(changed);
                    }
                }
                Ok(Err(e)) => warn!("Watch error: {:?}", e),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Watch channel closed");
                    break;
                }
            }
        }

        info!("Stopped watching {:?}", self.root);
        Ok(())
    }

    /// Indexable paths among `paths`, sorted and without duplicates
    fn relevant_paths(&self, paths: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
        paths
            .into_iter()
            .filter(|p| !p.starts_with(&self.data_dir))
            .filter(|p| self.collector.accepts(&self.root, p))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn handle_changes(&self, changed: Vec<PathBuf>) {
        info!("Processing {} changed files...", changed.len());

        match self.coordinator.reindex_files(&changed) {
            Ok(report) => info!(
                files = report.requested,
                removed = report.missing,
                chunks = report.chunks,
                "Index updated"
            ),
            Err(e) => warn!("Failed to reindex changed files: {}", e),
        }
    }
}
