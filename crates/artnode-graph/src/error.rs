//! Build-fatal errors.
//!
//! Node-level problems never surface here; they become [`Diagnostic`]s on
//! the graph. A [`BuildError`] means no new graph was published and the
//! previous one stays in service.
//!
//! [`Diagnostic`]: artnode_schema::Diagnostic

use std::path::PathBuf;

use artnode_storage::StorageError;

/// Error returned when a build aborts.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The content-root meta document is missing or invalid, or the root
    /// index document is invalid.
    #[error("Content root is invalid: {0}")]
    RootMeta(String),
    /// Two nodes resolve to the same route.
    #[error("Route collision on '{route}': '{first}' and '{second}'")]
    RouteCollision {
        route: String,
        first: String,
        second: String,
    },
    /// The `root_content` target is missing or invalid.
    #[error("root_content target '{target}' is {reason}")]
    RootResolution { target: String, reason: &'static str },
    /// A full build is already running. Retry later.
    #[error("A build is already in progress")]
    Busy,
    /// The build was cancelled before it could be published.
    #[error("Build cancelled")]
    Cancelled,
    /// Writing artifacts failed.
    #[error(transparent)]
    Emit(#[from] EmitError),
    /// Storage failed outside of any single node.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The worker pool could not be created.
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl BuildError {
    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::Cancelled)
    }
}

/// Error returned when artifacts cannot be serialized or written.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("Failed to serialize {artifact}: {source}")]
    Serialize {
        artifact: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
