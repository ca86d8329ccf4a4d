use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by document store backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or failed mid-request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What was being attempted.
        message: String,
        /// Backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend refused the write (permission denied, revision conflict...).
    #[error("write rejected for `{path}`: {reason}")]
    Rejected {
        /// Document the write targeted.
        path: String,
        /// Backend explanation.
        reason: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a rejection for the document at `path`.
    pub fn rejected(path: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::Rejected {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
