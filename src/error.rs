use thiserror::Error;

use crate::{dao::storage::StorageError, state::game::MoveError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable or refused the write.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// The rules refused the action; nothing was written.
    #[error("move rejected: {0}")]
    Rejected(#[from] MoveError),
    /// Invalid input provided by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The client has left the session.
    #[error("session closed: {0}")]
    Closed(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}
