//! Storage abstraction for the artnode content graph compiler.
//!
//! This crate provides a [`Storage`] trait that abstracts directory listing,
//! document reading and change notification away from the underlying backend.
//! This enables:
//!
//! - **Unit testing** without touching the real filesystem
//! - **Backend flexibility** (local filesystem today, object stores later)
//! - **Clean separation** between graph compilation and I/O
//!
//! # Architecture
//!
//! The crate provides:
//! - [`Storage`] trait with `list()`, `read()`, `identity()` and `watch()` methods
//! - [`StorageError`] with semantic kinds and retry guidance
//! - [`StorageEvent`] types for change notification
//! - [`MockStorage`] for testing (behind `mock` feature flag)
//!
//! # Example
//!
//! ```ignore
//! use artnode_storage::Storage;
//! use artnode_storage_fs::FsStorage;
//!
//! let storage = FsStorage::new("content".into());
//! for entry in storage.list("artists")? {
//!     println!("{} ({:?})", entry.name, entry.kind);
//! }
//! ```

mod event;
#[cfg(feature = "mock")]
mod mock;
mod storage;

pub use event::{StorageEvent, StorageEventKind, StorageEventReceiver, WatchHandle};
#[cfg(feature = "mock")]
pub use mock::MockStorage;
pub use storage::{
    DirEntry, EntryKind, Storage, StorageError, StorageErrorKind, join_path,
    parent_path,
};
