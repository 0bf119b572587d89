// security/src/errors.rs

use lib::errors::{ServiceError, StoreError};
use models::errors::ValidationError;
use thiserror::Error;

/// Custom authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),

    #[error("No OTP was requested for this Aadhaar number")]
    OtpNotRequested,

    #[error("OTP has expired, please request a new one")]
    OtpExpired,

    #[error("Invalid OTP")]
    OtpMismatch,

    #[error("Too many incorrect attempts, please request a new OTP")]
    TooManyAttempts,

    #[error("Not authorized, no credential provided")]
    MissingCredential,

    #[error("Not authorized, invalid token: {0}")]
    InvalidToken(String),

    #[error("Not authorized, unknown or expired session")]
    UnknownSession,

    #[error("DigiLocker authentication has not completed for this session")]
    SessionPending,

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("JWT error: {0}")]
    Jwt(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Service(ServiceError::Store(err))
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Provider(err.to_string())
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
