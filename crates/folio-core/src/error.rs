use thiserror::Error;

use crate::types::RecordKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cancelled")]
    Cancelled,

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Storage(StorageError::Cancelled))
    }
}

/// Failures reported by a storage sink.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Backend error writing {kind}: {message}")]
    Backend { kind: RecordKind, message: String },

    #[error("Gave up writing {kind} batch after {attempts} attempts: {last}")]
    RetriesExhausted {
        kind: RecordKind,
        attempts: u32,
        last: String,
    },

    #[error("Storage write cancelled")]
    Cancelled,
}

impl StorageError {
    pub fn backend(kind: RecordKind, message: impl std::fmt::Display) -> Self {
        Self::Backend { kind, message: message.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
