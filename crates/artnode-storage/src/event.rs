//! Storage event types for change notification.
//!
//! Provides types for subscribing to storage changes through the
//! [`Storage::watch`](crate::Storage::watch) method.

use std::sync::mpsc;
use std::time::Duration;

/// Kind of storage event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageEventKind {
    /// File was created.
    Created,
    /// File was modified.
    Modified,
    /// File was removed.
    Removed,
}

/// A storage change event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEvent {
    /// Path of the changed file relative to the content root, `/`-separated
    /// (e.g., `"artists/zol/index.yaml"`).
    pub path: String,
    /// Kind of change.
    pub kind: StorageEventKind,
}

impl StorageEvent {
    /// Create a new event.
    #[must_use]
    pub fn new(path: impl Into<String>, kind: StorageEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Receiver for storage events.
///
/// Wraps a [`std::sync::mpsc::Receiver`] for synchronous event delivery.
/// Can be iterated with [`iter()`](Self::iter) or polled with
/// [`recv()`](Self::recv)/[`try_recv()`](Self::try_recv).
pub struct StorageEventReceiver {
    rx: mpsc::Receiver<StorageEvent>,
}

impl StorageEventReceiver {
    /// Create a new receiver from a channel receiver.
    #[must_use]
    pub fn new(rx: mpsc::Receiver<StorageEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event (blocking).
    ///
    /// Returns `None` when the sender is dropped.
    #[must_use]
    pub fn recv(&self) -> Option<StorageEvent> {
        self.rx.recv().ok()
    }

    /// Wait for the next event for at most `timeout`.
    ///
    /// Returns `None` on timeout or when the sender is dropped.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<StorageEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is available or the sender is dropped.
    #[must_use]
    pub fn try_recv(&self) -> Option<StorageEvent> {
        self.rx.try_recv().ok()
    }

    /// Returns an iterator over events.
    ///
    /// Blocks until an event is available. Stops when the sender is dropped.
    pub fn iter(&self) -> impl Iterator<Item = StorageEvent> + '_ {
        self.rx.iter()
    }

    /// Create a no-op receiver that never yields events.
    ///
    /// Used by the default `Storage::watch()` implementation for backends
    /// that don't support change notification.
    pub(crate) fn no_op() -> Self {
        let (_tx, rx) = mpsc::channel();
        Self { rx }
    }
}

/// Handle to stop watching for changes.
///
/// Uses RAII pattern - dropping the handle stops watching automatically.
/// Signals shutdown by dropping the internal channel sender.
pub struct WatchHandle {
    _shutdown: Option<mpsc::Sender<()>>,
}

impl WatchHandle {
    /// Create a new watch handle with a shutdown signal sender.
    ///
    /// When the handle is dropped, the sender is dropped, causing the
    /// receiver to return `Err(RecvError)` which signals shutdown.
    #[must_use]
    pub fn new(shutdown: mpsc::Sender<()>) -> Self {
        Self {
            _shutdown: Some(shutdown),
        }
    }

    /// Stop watching immediately (consumes the handle).
    pub fn stop(mut self) {
        self._shutdown.take();
    }

    /// Create a no-op handle that does nothing on drop.
    #[must_use]
    pub fn no_op() -> Self {
        Self { _shutdown: None }
    }
}
