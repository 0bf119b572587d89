// models/src/medical/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::{new_id, AadhaarNumber};

/// How a user proved who they are. A user carries exactly one of these for
/// life; it is the lookup key used on every later login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    Aadhaar(AadhaarNumber),
    /// Subject identifier handed back by DigiLocker.
    DigiLocker(String),
}

impl Identity {
    /// Stable string key for secondary indexes.
    pub fn index_key(&self) -> String {
        match self {
            Identity::Aadhaar(number) => format!("aadhaar:{}", &**number),
            Identity::DigiLocker(subject) => format!("digilocker:{}", subject),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub identity: Identity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(name: impl Into<String>, identity: Identity, now: DateTime<Utc>) -> Self {
        User {
            id: new_id(),
            name: name.into(),
            identity,
            created_at: now,
            updated_at: now,
            last_login: None,
        }
    }

    pub fn aadhaar_number(&self) -> Option<&AadhaarNumber> {
        match &self.identity {
            Identity::Aadhaar(number) => Some(number),
            Identity::DigiLocker(_) => None,
        }
    }

    pub fn profile(&self) -> UserProfile {
        let (aadhaar_number, external_session_id) = match &self.identity {
            Identity::Aadhaar(number) => (Some(number.masked()), None),
            Identity::DigiLocker(subject) => (None, Some(subject.clone())),
        };
        UserProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            aadhaar_number,
            external_session_id,
            last_login: self.last_login,
        }
    }
}

/// The public view of a user. The Aadhaar number is always masked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aadhaar_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_session_id: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
}
