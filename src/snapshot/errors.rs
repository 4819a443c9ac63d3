//! # Snapshot errors

use thiserror::Error;

use crate::repos::RepoError;

/// Result type for snapshot operations
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Snapshot errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Invalid test description: {0}")]
    Description(String),

    #[error("Snapshot I/O failure at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("Snapshot copy task failed: {0}")]
    CopyTask(String),
}

impl SnapshotError {
    /// I/O error with the offending path attached
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
