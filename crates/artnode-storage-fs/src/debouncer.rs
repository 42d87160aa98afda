//! Event debouncing for storage change notification.
//!
//! Editors tend to emit several events per save (truncate, write, rename).
//! The debouncer folds them into one event per tree path.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use artnode_storage::StorageEventKind;

/// A debounced event keyed by tree path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DebouncedEvent {
    pub path: String,
    pub kind: StorageEventKind,
}

struct PendingEvent {
    kind: StorageEventKind,
    deadline: Instant,
}

/// Thread-safe event debouncer.
///
/// Each recorded event pushes the deadline of its path forward, so a path is
/// only released once it has been quiet for the debounce window.
pub(crate) struct EventDebouncer {
    pending: Mutex<HashMap<String, PendingEvent>>,
    window: Duration,
}

impl EventDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Record an event. Called from watcher callbacks.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn record(&self, path: String, kind: StorageEventKind) {
        use std::collections::hash_map::Entry;

        let mut pending = self.pending.lock().unwrap();
        let deadline = Instant::now() + self.window;

        match pending.entry(path) {
            Entry::Vacant(entry) => {
                entry.insert(PendingEvent { kind, deadline });
            }
            Entry::Occupied(mut entry) => match Self::coalesce(entry.get().kind, kind) {
                Some(kind) => {
                    let event = entry.get_mut();
                    event.kind = kind;
                    event.deadline = deadline;
                }
                None => {
                    entry.remove();
                }
            },
        }
    }

    /// Fold a new event kind into a pending one.
    ///
    /// Returns `None` when the pair cancels out (created then removed).
    #[allow(clippy::match_same_arms)]
    fn coalesce(existing: StorageEventKind, new: StorageEventKind) -> Option<StorageEventKind> {
        use StorageEventKind::{Created, Modified, Removed};

        match (existing, new) {
            (Created, Created) => Some(Created),
            (Created, Modified) => Some(Created),
            (Created, Removed) => None,

            (Modified, Created) => Some(Created),
            (Modified, Modified) => Some(Modified),
            (Modified, Removed) => Some(Removed),

            // Replaced in place
            (Removed, Created) => Some(Modified),
            (Removed, Modified) => Some(Removed),
            (Removed, Removed) => Some(Removed),
        }
    }

    /// Take every event whose quiet window has elapsed, sorted by path.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn drain_ready(&self) -> Vec<DebouncedEvent> {
        let mut pending = self.pending.lock().unwrap();
        let now = Instant::now();

        let mut ready: Vec<DebouncedEvent> = Vec::new();
        pending.retain(|path, event| {
            if event.deadline <= now {
                ready.push(DebouncedEvent {
                    path: path.clone(),
                    kind: event.kind,
                });
                false
            } else {
                true
            }
        });
        ready.sort_by(|a, b| a.path.cmp(&b.path));
        ready
    }
}
