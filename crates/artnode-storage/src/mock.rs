//! Mock storage implementation for testing.
//!
//! Provides [`MockStorage`], an in-memory content tree for unit testing
//! without filesystem access.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, mpsc};
use std::time::Duration;

use crate::event::{StorageEvent, StorageEventKind, StorageEventReceiver, WatchHandle};
use crate::storage::{DirEntry, Storage, StorageError, StorageErrorKind, join_path};

const BACKEND: &str = "Mock";

/// Mock storage for testing.
///
/// Stores files in memory keyed by tree path. Directories are implied by file
/// paths. Use the builder methods to configure the mock with test data.
///
/// # Example
///
/// ```ignore
/// use artnode_storage::{MockStorage, Storage};
///
/// let storage = MockStorage::new()
///     .with_file("_meta.yaml", "theme: dark")
///     .with_file("artists/zol/index.yaml", "title: Zol");
///
/// let entries = storage.list("artists").unwrap();
/// let content = storage.read("artists/zol/index.yaml").unwrap();
/// ```
#[derive(Debug, Default)]
pub struct MockStorage {
    files: RwLock<BTreeMap<String, String>>,
    symlinks: RwLock<BTreeMap<String, String>>,
    unreadable: RwLock<BTreeSet<String>>,
    read_delays: RwLock<HashMap<String, Duration>>,
    event_sender: RwLock<Option<mpsc::Sender<StorageEvent>>>,
}

impl MockStorage {
    /// Create a new empty mock storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file with content.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.set_file(path, content);
        self
    }

    /// Add a directory symlink: `link` resolves to `target`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_symlink(self, link: impl Into<String>, target: impl Into<String>) -> Self {
        self.symlinks
            .write()
            .unwrap()
            .insert(link.into(), target.into());
        self
    }

    /// Mark a directory as unreadable (listing it fails with `PermissionDenied`).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_unreadable(self, dir: impl Into<String>) -> Self {
        self.unreadable.write().unwrap().insert(dir.into());
        self
    }

    /// Delay reads of a file, simulating a slow backend.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_read_delay(self, path: impl Into<String>, delay: Duration) -> Self {
        self.set_read_delay(path, delay);
        self
    }

    /// Delay reads of a file in place. A zero delay removes it.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn set_read_delay(&self, path: impl Into<String>, delay: Duration) {
        let mut delays = self.read_delays.write().unwrap();
        if delay.is_zero() {
            delays.remove(&path.into());
        } else {
            delays.insert(path.into(), delay);
        }
    }

    /// Create or replace a file in place.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn set_file(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files
            .write()
            .unwrap()
            .insert(path.into(), content.into());
    }

    /// Remove a file in place.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn remove_file(&self, path: &str) {
        self.files.write().unwrap().remove(path);
    }

    /// Emit a storage event.
    ///
    /// Only works if `watch()` has been called first.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn emit(&self, event: StorageEvent) {
        if let Some(sender) = self.event_sender.read().unwrap().as_ref() {
            let _ = sender.send(event);
        }
    }

    /// Emit a Modified event.
    pub fn emit_modified(&self, path: impl Into<String>) {
        self.emit(StorageEvent::new(path, StorageEventKind::Modified));
    }

    /// Resolve symlinks in a tree path, innermost prefix first.
    ///
    /// Resolution is bounded so a self-referencing link cannot spin forever.
    fn resolve(&self, path: &str) -> String {
        let symlinks = self.symlinks.read().unwrap();
        let mut current = path.to_owned();
        for _ in 0..64 {
            let hit = symlinks.iter().find_map(|(link, target)| {
                if current == *link {
                    Some(target.clone())
                } else {
                    current
                        .strip_prefix(link.as_str())
                        .and_then(|rest| rest.strip_prefix('/'))
                        .map(|rest| join_path(target, rest))
                }
            });
            match hit {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    fn error(kind: StorageErrorKind, path: &str) -> StorageError {
        StorageError::new(kind)
            .with_path(path)
            .with_backend(BACKEND)
    }
}

impl Storage for MockStorage {
    fn list(&self, dir: &str) -> Result<Vec<DirEntry>, StorageError> {
        let resolved = self.resolve(dir);
        if self.unreadable.read().unwrap().contains(&resolved) {
            return Err(Self::error(StorageErrorKind::PermissionDenied, dir));
        }

        let prefix = if resolved.is_empty() {
            String::new()
        } else {
            format!("{resolved}/")
        };

        let mut entries = BTreeSet::new();
        for path in self.files.read().unwrap().keys() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => entries.insert(DirEntry::dir(child)),
                None => entries.insert(DirEntry::file(rest)),
            };
        }
        let links: Vec<String> = self.symlinks.read().unwrap().keys().cloned().collect();
        for link in &links {
            let (parent, name) = link.rsplit_once('/').unwrap_or(("", link));
            if self.resolve(parent) == resolved {
                entries.insert(DirEntry::dir(name));
            }
        }

        if entries.is_empty() && !resolved.is_empty() {
            return Err(Self::error(StorageErrorKind::NotFound, dir));
        }
        Ok(entries.into_iter().collect())
    }

    fn read(&self, path: &str) -> Result<String, StorageError> {
        let delay = self.read_delays.read().unwrap().get(path).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let resolved = self.resolve(path);
        self.files
            .read()
            .unwrap()
            .get(&resolved)
            .cloned()
            .ok_or_else(|| Self::error(StorageErrorKind::NotFound, path))
    }

    fn exists(&self, path: &str) -> bool {
        let resolved = self.resolve(path);
        let prefix = format!("{resolved}/");
        let files = self.files.read().unwrap();
        resolved.is_empty()
            || files.contains_key(&resolved)
            || files.keys().any(|p| p.starts_with(&prefix))
    }

    fn identity(&self, dir: &str) -> Result<String, StorageError> {
        Ok(self.resolve(dir))
    }

    fn watch(&self) -> Result<(StorageEventReceiver, WatchHandle), StorageError> {
        let (tx, rx) = mpsc::channel();
        *self.event_sender.write().unwrap() = Some(tx);
        // MockStorage doesn't need cleanup
        Ok((StorageEventReceiver::new(rx), WatchHandle::no_op()))
    }
}
