//! Error type for the Sync State Store.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("sync state not found at {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sync state at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown issue state requested: {0}")]
    UnknownOperation(String),
}

pub type Result<T> = std::result::Result<T, StateError>;

impl StateError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound { .. })
    }

    /// Save failures surface to the engine as retryable; a fresh attempt
    /// next batch is expected to succeed once the underlying condition
    /// (disk full, permissions) clears.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StateError::Io { .. })
    }
}
