// models/src/errors.rs

pub use thiserror::Error;

/// A validation error raised while checking caller-supplied data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Aadhaar numbers are exactly 12 ASCII digits.
    #[error("Please provide a valid 12-digit Aadhaar number")]
    InvalidAadhaarNumber,
    /// OTP codes are exactly 6 ASCII digits.
    #[error("Please provide a valid 6-digit OTP")]
    InvalidOtpFormat,
    #[error("Please select at least one record")]
    EmptyRecordSelection,
    #[error("duration must be between {min} and {max} minutes, got {got}")]
    InvalidDuration { min: i64, max: i64, got: i64 },
    /// A required text field was empty or whitespace only.
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("unknown record type: {0}")]
    UnknownRecordType(String),
    #[error("File type not supported. Please upload images, PDFs, or office documents.")]
    UnsupportedFileType,
    #[error("Record already shared with this user")]
    AlreadyShared,
    #[error("You cannot share a record with yourself")]
    SelfShare,
    #[error("expiry must be in the future")]
    ExpiryInPast,
    #[error("emergency tokens do not expire and cannot be extended")]
    NotExtendable,
    #[error("no extension request is pending for this token")]
    NoPendingExtension,
}

/// A type alias for a `Result` that returns a `ValidationError` on failure.
pub type ValidationResult<T> = Result<T, ValidationError>;
