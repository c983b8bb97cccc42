use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table already exists: {0:?}")]
    AlreadyExists(PathBuf),

    #[error("Operation unsupported: {0}")]
    Unsupported(&'static str),

    #[error("Malformed table file {path:?}: {reason}")]
    MalformedFile { path: PathBuf, reason: String },

    #[error("Failed to decode row {row}: {reason}")]
    Decode { row: u64, reason: String },

    #[error("Cannot encode cell: {0}")]
    Encode(String),
}

impl StorageError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StorageError::MalformedFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(row: u64, reason: impl Into<String>) -> Self {
        StorageError::Decode {
            row,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
