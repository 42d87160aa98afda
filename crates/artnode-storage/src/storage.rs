//! Storage trait and error types.
//!
//! Provides the core [`Storage`] trait for abstracting directory listing and
//! document retrieval, along with [`StorageError`] for unified error handling
//! across backends.
//!
//! # Tree Path Convention
//!
//! All path parameters in Storage methods are **tree paths** relative to the
//! content root, not OS paths:
//! - `""` - the content root
//! - `"artists"` - a top-level directory
//! - `"artists/zol/index.yaml"` - a file inside a nested directory
//!
//! Segments are always separated by `/`. Storage implementations handle the
//! mapping from tree paths to their internal representation.

use std::path::PathBuf;

use crate::event::{StorageEventReceiver, WatchHandle};

/// Kind of a directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory (symbolic links to directories are reported as directories).
    Dir,
}

/// A single entry returned by [`Storage::list`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    /// Entry name (last path segment).
    pub name: String,
    /// Entry kind.
    pub kind: EntryKind,
}

impl DirEntry {
    /// Create a file entry.
    #[must_use]
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    /// Create a directory entry.
    #[must_use]
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Dir,
        }
    }

    /// True if this entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Join a tree path and a child name.
///
/// ```
/// use artnode_storage::join_path;
///
/// assert_eq!(join_path("", "artists"), "artists");
/// assert_eq!(join_path("artists", "zol"), "artists/zol");
/// ```
#[must_use]
pub fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_owned()
    } else {
        format!("{base}/{name}")
    }
}

/// Parent of a tree path, `None` for the content root.
///
/// ```
/// use artnode_storage::parent_path;
///
/// assert_eq!(parent_path("artists/zol"), Some("artists"));
/// assert_eq!(parent_path("artists"), Some(""));
/// assert_eq!(parent_path(""), None);
/// ```
#[must_use]
pub fn parent_path(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map_or("", |(parent, _)| parent))
}

/// Semantic error categories (inspired by Object Store + `OpenDAL`).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum StorageErrorKind {
    /// Resource does not exist.
    NotFound,
    /// Permission denied.
    PermissionDenied,
    /// Invalid path or identifier.
    InvalidPath,
    /// Other/unknown error category.
    Other,
}

/// Storage error with semantic kind and backend-specific source.
#[derive(Debug)]
pub struct StorageError {
    /// Semantic error category.
    pub kind: StorageErrorKind,
    /// Path context (if applicable).
    pub path: Option<PathBuf>,
    /// Backend identifier (e.g., "Fs", "Mock").
    pub backend: Option<&'static str>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StorageError {
    /// Create a new storage error.
    #[must_use]
    pub fn new(kind: StorageErrorKind) -> Self {
        Self {
            kind,
            path: None,
            backend: None,
            source: None,
        }
    }

    /// Attach path context.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach backend identifier.
    #[must_use]
    pub fn with_backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Create a not found error with path.
    #[must_use]
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::new(StorageErrorKind::NotFound).with_path(path)
    }

    /// Create a storage error from an I/O error.
    #[must_use]
    pub fn io(err: std::io::Error, path: Option<PathBuf>) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            _ => StorageErrorKind::Other,
        };
        let mut error = Self::new(kind).with_source(err);
        if let Some(p) = path {
            error = error.with_path(p);
        }
        error
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: "[Backend] Kind: message (path: /foo/bar)"
        if let Some(backend) = self.backend {
            write!(f, "[{backend}] ")?;
        }

        let kind_str = match self.kind {
            StorageErrorKind::NotFound => "Not found",
            StorageErrorKind::PermissionDenied => "Permission denied",
            StorageErrorKind::InvalidPath => "Invalid path",
            StorageErrorKind::Other => "Error",
        };

        write!(f, "{kind_str}")?;

        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }

        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }

        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Storage abstraction for content tree access.
///
/// Provides a unified interface for walking and reading the content tree
/// regardless of backend. The compiler never touches files directly; it only
/// goes through this trait, which keeps every pipeline stage testable with an
/// in-memory tree.
pub trait Storage: Send + Sync {
    /// List the entries of a directory.
    ///
    /// Hidden entries are returned as-is; filtering is the caller's concern.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the directory doesn't exist or can't be read.
    fn list(&self, dir: &str) -> Result<Vec<DirEntry>, StorageError>;

    /// Read full file content as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the file doesn't exist or can't be read.
    fn read(&self, path: &str) -> Result<String, StorageError>;

    /// Check if a file or directory exists at the given tree path.
    ///
    /// Returns `false` on errors (treats errors as "doesn't exist").
    fn exists(&self, path: &str) -> bool;

    /// Stable identity of a directory, used to detect symlink cycles.
    ///
    /// Two tree paths that reach the same physical directory must return the
    /// same identity. The filesystem backend uses the canonical path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the directory can't be resolved.
    fn identity(&self, dir: &str) -> Result<String, StorageError>;

    /// Start watching for file changes.
    ///
    /// Returns a receiver for events and a handle to stop watching.
    /// Events contain tree paths of files, not OS paths.
    /// Default implementation returns a no-op receiver for backends
    /// that don't support change notification.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if watching cannot be started.
    fn watch(&self) -> Result<(StorageEventReceiver, WatchHandle), StorageError> {
        Ok((StorageEventReceiver::no_op(), WatchHandle::no_op()))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_dir_entry_constructors() {
        assert!(DirEntry::dir("artists").is_dir());
        assert!(!DirEntry::file("index.yaml").is_dir());
    }

    #[test]
    fn test_join_and_parent_path() {
        assert_eq!(join_path("", "a"), "a");
        assert_eq!(join_path("a/b", "c"), "a/b/c");
        assert_eq!(parent_path("a/b/c"), Some("a/b"));
        assert_eq!(parent_path("a"), Some(""));
        assert_eq!(parent_path(""), None);
    }

    #[test]
    fn test_storage_error_new() {
        let err = StorageError::new(StorageErrorKind::NotFound);

        assert_eq!(err.kind, StorageErrorKind::NotFound);
        assert!(err.path.as_deref().is_none());
        assert!(err.backend.is_none());
    }

    #[test]
    fn test_storage_error_with_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = StorageError::new(StorageErrorKind::NotFound).with_source(io_err);

        let source = std::error::Error::source(&err).unwrap();
        assert!(source.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn test_storage_error_io_permission_denied() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::io(io_err, Some(PathBuf::from("private")));

        assert_eq!(err.kind, StorageErrorKind::PermissionDenied);
        assert_eq!(err.path.as_deref(), Some(Path::new("private")));
    }

    #[test]
    fn test_storage_error_io_other() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = StorageError::io(io_err, None);

        assert_eq!(err.kind, StorageErrorKind::Other);
        assert_eq!(err.to_string(), "Error: timed out");
    }

    #[test]
    fn test_storage_error_display_full() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = StorageError::new(StorageErrorKind::NotFound)
            .with_backend("Fs")
            .with_path("/foo/bar")
            .with_source(io_err);

        assert_eq!(
            err.to_string(),
            "[Fs] Not found: file not found (path: /foo/bar)"
        );
    }

    #[test]
    fn test_storage_error_display_simple() {
        let err = StorageError::new(StorageErrorKind::NotFound);

        assert_eq!(err.to_string(), "Not found");
    }

    #[test]
    fn test_storage_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StorageError>();
    }
}
