// Central error type for the queue.

use thiserror::Error;

/// Application-level error taxonomy.
///
/// `Validation`, `NotFound` and `InvalidTransition` are caller mistakes
/// and never change state. `Storage` is the durable store failing under
/// us. A job's execution failure is deliberately NOT an error here: a
/// non-zero exit is the normal signal driving the retry/DLQ branch.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using QueueError
pub type Result<T> = std::result::Result<T, QueueError>;

// sqlx::Error conversion lives in the infra-sqlite crate (orphan rules);
// adapters hand us plain strings.
impl From<String> for QueueError {
    fn from(err: String) -> Self {
        QueueError::Storage(err)
    }
}
