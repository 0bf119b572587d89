// models/src/identifiers.rs

use core::ops::Deref;
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ValidationError, ValidationResult};

/// Generates a fresh identifier for a stored entity.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn all_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

/// A 12-digit Aadhaar number. Surrounding whitespace and inner spaces, as
/// printed on the card, are accepted and stripped.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AadhaarNumber(String);

impl AadhaarNumber {
    pub fn new(value: &str) -> ValidationResult<Self> {
        let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        if !all_digits(&compact, 12) {
            return Err(ValidationError::InvalidAadhaarNumber);
        }
        Ok(Self(compact))
    }

    /// Renders the number with all but the last four digits hidden.
    pub fn masked(&self) -> String {
        format!("XXXX-XXXX-{}", &self.0[8..])
    }
}

impl Deref for AadhaarNumber {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for AadhaarNumber {
    type Err = ValidationError;

    fn from_str(s: &str) -> ValidationResult<Self> {
        Self::new(s)
    }
}

impl fmt::Display for AadhaarNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 6-digit one-time password as typed by the user.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OtpCode(String);

impl OtpCode {
    pub fn new(value: &str) -> ValidationResult<Self> {
        let trimmed = value.trim();
        if !all_digits(trimmed, 6) {
            return Err(ValidationError::InvalidOtpFormat);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OtpCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> ValidationResult<Self> {
        Self::new(s)
    }
}
