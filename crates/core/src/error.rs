//! File service error types.

use depot_shared::{AppError, FileId};
use thiserror::Error;

/// Result type alias using `FileError`.
pub type FileResult<T> = Result<T, FileError>;

/// File storage and retrieval errors.
#[derive(Debug, Error)]
pub enum FileError {
    /// Object or metadata absent.
    #[error("file not found: {key}")]
    NotFound {
        /// Id or key that was not found.
        key: String,
    },

    /// Disallowed upload or malformed request.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Backend or transport failure.
    #[error("storage backend error{}: {message}", code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    StorageBackend {
        /// Backend error code, when one is available.
        code: Option<String>,
        /// Human readable failure description.
        message: String,
    },

    /// Persisted metadata unreadable or missing required fields.
    #[error("corrupt metadata for {id}: {reason}")]
    CorruptMetadata {
        /// Id whose metadata is corrupt.
        id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Invalid or unusable storage configuration.
    #[error("storage configuration error: {0}")]
    Configuration(String),
}

impl FileError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(key: impl std::fmt::Display) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a backend error.
    #[must_use]
    pub fn backend(code: Option<String>, message: impl Into<String>) -> Self {
        Self::StorageBackend {
            code,
            message: message.into(),
        }
    }

    /// Create a corrupt metadata error.
    #[must_use]
    pub fn corrupt_metadata(id: FileId, reason: impl Into<String>) -> Self {
        Self::CorruptMetadata {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<opendal::Error> for FileError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => Self::NotFound {
                key: err.to_string(),
            },
            kind => Self::StorageBackend {
                code: Some(kind.to_string()),
                message: err.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for FileError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageBackend {
            code: Some(format!("{:?}", err.kind())),
            message: err.to_string(),
        }
    }
}

impl From<FileError> for AppError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::NotFound { .. } => Self::NotFound(err.to_string()),
            FileError::Validation(msg) => Self::Validation(msg),
            FileError::StorageBackend { .. } | FileError::CorruptMetadata { .. } => {
                Self::Storage(err.to_string())
            }
            FileError::Configuration(msg) => Self::Configuration(msg),
        }
    }
}
