//! # Checkpoint errors

use thiserror::Error;

use crate::snapshot::SnapshotError;

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Checkpoint errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failure at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Checkpoint serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Checkpoint restore failure: {0}")]
    Restore(#[from] SnapshotError),
}

impl CheckpointError {
    /// I/O error with the offending path attached
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
