// lib/src/errors.rs

use bincode::error::{DecodeError, EncodeError};
use models::errors::ValidationError;
use thiserror::Error;

/// Failures raised by a storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database operation failed: {0}")]
    Database(String),

    #[error("Serialization/Deserialization error: {0}")]
    Serialization(String),

    /// A unique key was already taken.
    #[error("Already Exists: {0}")]
    Conflict(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<EncodeError> for StoreError {
    fn from(err: EncodeError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<DecodeError> for StoreError {
    fn from(err: DecodeError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Domain taxonomy surfaced by the services. The HTTP layer maps each
/// variant onto one status code.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("This link has expired")]
    Expired,

    #[error("This link has been revoked")]
    Revoked,

    #[error("File exceeds the maximum upload size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        ServiceError::Forbidden(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ServiceError::NotFound(what.into())
    }

    /// Whether the detail must stay server-side.
    pub fn is_internal(&self) -> bool {
        matches!(self, ServiceError::Internal(_) | ServiceError::Store(_))
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Internal(format!("Async task join error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
