//! Filesystem storage backend for the artnode content graph compiler.
//!
//! This crate provides [`FsStorage`], a local-filesystem implementation of the
//! [`Storage`](artnode_storage::Storage) trait. It handles:
//!
//! - Directory listing with symlinks followed to their targets
//! - Document reads relative to the content root
//! - Canonical directory identity for cycle detection
//! - File watching with glob filtering and event debouncing
//!
//! # Example
//!
//! ```ignore
//! use std::path::PathBuf;
//! use artnode_storage::Storage;
//! use artnode_storage_fs::FsStorage;
//!
//! let storage = FsStorage::new(PathBuf::from("content"));
//! for entry in storage.list("artists")? {
//!     println!("{}", entry.name);
//! }
//! ```

mod debouncer;

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use glob::Pattern;
use notify::{RecursiveMode, Watcher};

use artnode_storage::{
    DirEntry, Storage, StorageError, StorageErrorKind, StorageEvent, StorageEventKind,
    StorageEventReceiver, WatchHandle,
};
use debouncer::EventDebouncer;

/// Backend identifier for error messages.
const BACKEND: &str = "Fs";

/// Default quiet window before a burst of file events is released.
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

fn notify_error(e: notify::Error) -> StorageError {
    StorageError::new(StorageErrorKind::Other)
        .with_backend(BACKEND)
        .with_source(e)
}

/// Convert a `notify::EventKind` to a `StorageEventKind`.
///
/// Returns `None` for event kinds that are not relevant (e.g., Access).
fn storage_event_kind(kind: notify::EventKind) -> Option<StorageEventKind> {
    match kind {
        notify::EventKind::Create(_) => Some(StorageEventKind::Created),
        notify::EventKind::Modify(_) => Some(StorageEventKind::Modified),
        notify::EventKind::Remove(_) => Some(StorageEventKind::Removed),
        _ => None,
    }
}

/// Convert a path relative to the content root into a `/`-separated tree path.
fn to_tree_path(rel_path: &Path) -> String {
    rel_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Filesystem-backed content storage.
pub struct FsStorage {
    source_dir: PathBuf,
    watch_patterns: Vec<Pattern>,
    debounce: Duration,
}

impl FsStorage {
    /// Create storage rooted at `source_dir`, watching every file.
    #[must_use]
    pub fn new(source_dir: PathBuf) -> Self {
        Self {
            source_dir,
            watch_patterns: Vec::new(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Create storage that only reports changes matching `patterns`.
    ///
    /// Patterns are matched against paths relative to the content root.
    /// An empty list matches every file.
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile.
    pub fn with_patterns(
        source_dir: PathBuf,
        patterns: &[String],
    ) -> Result<Self, glob::PatternError> {
        let watch_patterns = patterns
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            watch_patterns,
            ..Self::new(source_dir)
        })
    }

    /// Set the quiet window used to fold bursts of file events.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Content root on disk.
    #[must_use]
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Rejects paths that could escape the content root.
    fn validate_path(path: &str) -> Result<(), StorageError> {
        if path.split('/').any(|part| part == "..") || path.starts_with('/') {
            return Err(StorageError::new(StorageErrorKind::InvalidPath)
                .with_path(path)
                .with_backend(BACKEND));
        }
        Ok(())
    }

    fn full_path(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.source_dir.clone(), |acc, part| acc.join(part))
    }

    fn io_error(err: std::io::Error, path: &str) -> StorageError {
        StorageError::io(err, Some(PathBuf::from(path))).with_backend(BACKEND)
    }
}

impl Storage for FsStorage {
    fn list(&self, dir: &str) -> Result<Vec<DirEntry>, StorageError> {
        Self::validate_path(dir)?;
        let read_dir = fs::read_dir(self.full_path(dir)).map_err(|e| Self::io_error(e, dir))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| Self::io_error(e, dir))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            // fs::metadata follows symlinks, so linked dirs list as dirs
            match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_dir() => entries.push(DirEntry::dir(name)),
                Ok(_) => entries.push(DirEntry::file(name)),
                Err(e) => {
                    tracing::debug!(path = %entry.path().display(), error = %e, "Skipping dangling entry");
                }
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read(&self, path: &str) -> Result<String, StorageError> {
        Self::validate_path(path)?;
        fs::read_to_string(self.full_path(path)).map_err(|e| Self::io_error(e, path))
    }

    fn exists(&self, path: &str) -> bool {
        Self::validate_path(path).is_ok() && self.full_path(path).exists()
    }

    fn identity(&self, dir: &str) -> Result<String, StorageError> {
        Self::validate_path(dir)?;
        let canonical = fs::canonicalize(self.full_path(dir)).map_err(|e| Self::io_error(e, dir))?;
        Ok(canonical.to_string_lossy().into_owned())
    }

    fn watch(&self) -> Result<(StorageEventReceiver, WatchHandle), StorageError> {
        let (event_tx, event_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let debouncer = Arc::new(EventDebouncer::new(self.debounce));

        let source_dir = self.source_dir.clone();
        let patterns = self.watch_patterns.clone();
        let watcher_debouncer = Arc::clone(&debouncer);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else { return };
            let Some(kind) = storage_event_kind(event.kind) else {
                return;
            };
            for path in event.paths {
                let Ok(rel_path) = path.strip_prefix(&source_dir) else {
                    continue;
                };
                if patterns.is_empty() || patterns.iter().any(|p| p.matches_path(rel_path)) {
                    watcher_debouncer.record(to_tree_path(rel_path), kind);
                }
            }
        })
        .map_err(notify_error)?;

        watcher
            .watch(&self.source_dir, RecursiveMode::Recursive)
            .map_err(notify_error)?;

        tracing::info!(root = %self.source_dir.display(), "Watching content root");

        // Drain thread owns the watcher to keep it alive.
        std::thread::spawn(move || {
            let _watcher = watcher;

            loop {
                match shutdown_rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                }

                for event in debouncer.drain_ready() {
                    if event_tx
                        .send(StorageEvent::new(event.path, event.kind))
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });

        Ok((
            StorageEventReceiver::new(event_rx),
            WatchHandle::new(shutdown_tx),
        ))
    }
}
