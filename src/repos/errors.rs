//! # Repository plumbing errors

use thiserror::Error;

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

/// Repository plumbing errors
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} exited with status code {code}:\n{stdout}\n{stderr}")]
    ExitStatus {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Unexpected output from {command}: {message}")]
    Output { command: String, message: String },

    #[error("Failed to read repo list {list}: {source}")]
    RepoList {
        list: String,
        source: std::io::Error,
    },

    #[error("Failed to parse test listing: {0}")]
    ListParse(#[from] serde_json::Error),
}
