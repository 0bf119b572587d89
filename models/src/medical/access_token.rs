// models/src/medical/access_token.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::new_id;
use crate::medical::access_log::RequestOrigin;
use crate::medical::access_window::AccessWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Share,
    Emergency,
}

/// Lifecycle position of a token as seen at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenState {
    Active,
    ExpiringSoon,
    Expired,
    Revoked,
}

/// Why a token cannot be used. Expiry wins over revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenUnusable {
    Expired,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyDetails {
    pub emergency_contact: String,
    pub additional_info: String,
}

/// One successful resolution of the token by a third party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEvent {
    pub accessed_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AccessEvent {
    pub fn new(accessed_at: DateTime<Utc>, origin: &RequestOrigin) -> Self {
        AccessEvent {
            accessed_at,
            ip_address: origin.ip_address.clone(),
            user_agent: origin.user_agent.clone(),
        }
    }
}

/// A holder's request for more time, waiting on the owner's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRequest {
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

/// A bearer credential over a fixed, ordered set of record ids.
///
/// Share tokens carry a deadline; emergency tokens carry none and hold the
/// free-text emergency details instead. Record ids are references only and
/// may outlive the records they point at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub id: String,
    #[serde(rename = "user")]
    pub owner: String,
    pub token: String,
    pub record_ids: Vec<String>,
    pub expires_at: AccessWindow,
    pub is_active: bool,
    pub emergency: Option<EmergencyDetails>,
    pub access_logs: Vec<AccessEvent>,
    pub pending_extension: Option<ExtensionRequest>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new_share(
        owner: impl Into<String>,
        token: String,
        record_ids: Vec<String>,
        expires_at: AccessWindow,
        now: DateTime<Utc>,
    ) -> Self {
        Self::build(owner.into(), token, record_ids, expires_at, None, now)
    }

    pub fn new_emergency(
        owner: impl Into<String>,
        token: String,
        record_ids: Vec<String>,
        details: EmergencyDetails,
        now: DateTime<Utc>,
    ) -> Self {
        Self::build(owner.into(), token, record_ids, AccessWindow::permanent(), Some(details), now)
    }

    fn build(
        owner: String,
        token: String,
        record_ids: Vec<String>,
        expires_at: AccessWindow,
        emergency: Option<EmergencyDetails>,
        now: DateTime<Utc>,
    ) -> Self {
        AccessToken {
            id: new_id(),
            owner,
            token,
            record_ids,
            expires_at,
            is_active: true,
            emergency,
            access_logs: Vec::new(),
            pending_extension: None,
            created_at: now,
            revoked_at: None,
        }
    }

    pub fn kind(&self) -> TokenKind {
        if self.emergency.is_some() {
            TokenKind::Emergency
        } else {
            TokenKind::Share
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner == user_id
    }

    /// Expiry is checked first, so a revoked token past its deadline reports
    /// `Expired`.
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), TokenUnusable> {
        if self.expires_at.is_expired_at(now) {
            return Err(TokenUnusable::Expired);
        }
        if !self.is_active {
            return Err(TokenUnusable::Revoked);
        }
        Ok(())
    }

    pub fn state_at(&self, now: DateTime<Utc>, expiring_soon: Duration) -> TokenState {
        match self.check_usable(now) {
            Err(TokenUnusable::Expired) => TokenState::Expired,
            Err(TokenUnusable::Revoked) => TokenState::Revoked,
            Ok(()) => match self.expires_at.remaining_at(now) {
                Some(left) if left <= expiring_soon => TokenState::ExpiringSoon,
                _ => TokenState::Active,
            },
        }
    }

    /// Terminal. Returns `false` when the token was already revoked. A
    /// pending extension request is kept so a later decision reports the
    /// revocation.
    pub fn revoke(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_active = false;
        self.revoked_at = Some(now);
        true
    }
}
