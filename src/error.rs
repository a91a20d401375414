// Error taxonomy for project tree and project note operations
// Every operation returns these; only the event dispatcher and CLI turn them into notices

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeadlineError {
    /// Cache read before `load()` completed
    #[error("Project cache not initialized. Did you forget to call load()?")]
    NotInitialized,

    #[error("Project not found: {0}")]
    NotFound(String),

    /// Header id disagreed with the stored id; the header has already been restored
    #[error("ID change not allowed in {path}: found \"{found}\", restored \"{expected}\"")]
    IdentifierConflict {
        path: String,
        expected: String,
        found: String,
    },

    /// Project data exists but cannot be parsed
    #[error("Project data at {path} is corrupt: {message}")]
    CorruptData { path: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, DeadlineError>;
