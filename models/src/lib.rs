// models/src/lib.rs
//! Shared domain types for the records-sharing service: users, medical
//! records with their grants and attachments, access tokens and the audit
//! log entries written around them.

pub mod errors;
pub mod identifiers;
pub mod medical;

pub use errors::{ValidationError, ValidationResult};
pub use identifiers::{new_id, AadhaarNumber, OtpCode};
pub use medical::*;
