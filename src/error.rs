//! ReplicaLock Error Types

use thiserror::Error;

/// Result type alias for ReplicaLock operations
pub type Result<T> = std::result::Result<T, Error>;

/// ReplicaLock error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // Storage errors
    #[error("Replica not found: {0}")]
    ReplicaNotFound(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Task errors
    #[error("Task failed: {0}")]
    Join(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Check if this error is a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Check if this error is retryable
    ///
    /// Only storage I/O is considered transient; retry policy belongs to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Error::Cancelled
        } else {
            Error::Join(err.to_string())
        }
    }
}
