//! File discovery with directory pruning and priority ordering
//!
//! Walks a source tree, skips build/dependency/test directories, and orders
//! candidates so the most important code is indexed first.

use crate::config::normalize_extension;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Priority for files under no recognized directory
pub const DEFAULT_PRIORITY: u32 = 99;

/// Directory name -> rank (lower is indexed first)
const PRIORITY_DIRS: &[(&str, u32)] = &[
    ("middleware", 1),
    ("api", 2),
    ("src", 3),
    ("lib", 4),
    ("core", 5),
    ("utils", 6),
    ("services", 7),
    ("models", 8),
    ("routes", 9),
    ("handlers", 10),
];

/// Directories that are never descended into
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "vendor",
    "__pycache__",
    "venv",
    "dist",
    "build",
    "coverage",
    "test",
    "tests",
    "__tests__",
    "spec",
    "specs",
    "mocks",
    "fixtures",
    "target",
    "bin",
];

/// Walks a root and yields indexable files in priority order
#[derive(Debug, Clone)]
pub struct FileCollector {
    extensions: Vec<String>,
    max_file_size: u64,
}

impl FileCollector {
    /// Create a collector for the given extension allow-list
    pub fn new<I, S>(extensions: I, max_file_size: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| normalize_extension(e.as_ref()))
                .collect(),
            max_file_size,
        }
    }

    /// Collect candidate files under `root`
    ///
    /// Ordering is ascending priority, then path. Any traversal error aborts
    /// the whole collection; no partial list is returned.
    ///
    /// Symlinks to regular files are collected under the link's path.
    /// Symlinked directories are not descended into, and dangling links are skipped.
    pub fn collect(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<(u32, PathBuf)> = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_pruned_dir(entry));

        for entry in walker {
            let entry = entry?;
            // `is_file` follows symlinks, unlike `entry.file_type()`
            if !entry.path().is_file() || !self.has_allowed_extension(entry.path()) {
                continue;
            }

            let size = fs::metadata(entry.path())?.len();
            if size > self.max_file_size {
                debug!(file = %entry.path().display(), size, "Skipping large file");
                continue;
            }

            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            files.push((path_priority(relative), entry.into_path()));
        }

        files.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        info!("Collected {} candidate files under {:?}", files.len(), root);

        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Check if a path has an extension in the allow-list
    pub fn has_allowed_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    /// Check if a path (relative to `root`) would be collected, ignoring size
    ///
    /// Used by the watcher to filter change events.
    pub fn accepts(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let mut dirs = relative.components().rev().skip(1);
        self.has_allowed_extension(path)
            && !dirs.any(|c| is_skipped_name(&c.as_os_str().to_string_lossy()))
    }
}

fn is_pruned_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && is_skipped_name(&entry.file_name().to_string_lossy())
}

fn is_skipped_name(name: &str) -> bool {
    name.starts_with('.') || SKIP_DIRS.contains(&name)
}

/// Rank of the first recognized directory in a relative path
pub fn path_priority(relative: &Path) -> u32 {
    relative
        .components()
        .find_map(|component| {
            let name = component.as_os_str().to_str()?;
            PRIORITY_DIRS
                .iter()
                .find(|(dir, _)| *dir == name)
                .map(|(_, rank)| *rank)
        })
        .unwrap_or(DEFAULT_PRIORITY)
}
