//! CLI error types.

use artnode_config::ConfigError;
use artnode_graph::BuildError;
use artnode_schema::SchemaError;
use artnode_storage::StorageError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Schema(#[from] SchemaError),

    #[error("{0}")]
    Build(#[from] BuildError),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("invalid watch pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("{0}")]
    Validation(String),
}
