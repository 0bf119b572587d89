// models/src/medical/access_log.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessAction {
    Login,
    RecordViewed,
    RecordCreated,
    RecordUpdated,
    RecordDeleted,
    FileUploaded,
    FileDownloaded,
    FileDeleted,
    GrantCreated,
    GrantRevoked,
    ShareCreated,
    ShareAccessed,
    ShareRevoked,
    EmergencyCreated,
    EmergencyAccessed,
    EmergencyRevoked,
    ExtensionRequested,
    ExtensionGranted,
    ExtensionDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessChannel {
    #[default]
    Web,
    Mobile,
    Qr,
    Emergency,
    Api,
}

/// Network origin of a request, as far as it could be determined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Where a request came from and through which surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessContext {
    pub origin: RequestOrigin,
    pub channel: AccessChannel,
}

impl AccessContext {
    pub fn new(origin: RequestOrigin, channel: AccessChannel) -> Self {
        AccessContext { origin, channel }
    }

    pub fn via(&self, channel: AccessChannel) -> Self {
        AccessContext {
            origin: self.origin.clone(),
            channel,
        }
    }
}

/// One audit record. Entries are built once and appended; nothing updates
/// or removes them afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogEntry {
    pub id: String,
    /// The user whose data was touched.
    #[serde(rename = "user")]
    pub owner: String,
    /// Who acted. `None` for anonymous bearer-token holders.
    #[serde(rename = "accessedBy")]
    pub actor: Option<String>,
    pub record: Option<String>,
    pub action: AccessAction,
    #[serde(rename = "accessedVia")]
    pub channel: AccessChannel,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub details: String,
}

impl AccessLogEntry {
    pub fn new(
        owner: impl Into<String>,
        action: AccessAction,
        ctx: &AccessContext,
        timestamp: DateTime<Utc>,
    ) -> Self {
        AccessLogEntry {
            id: new_id(),
            owner: owner.into(),
            actor: None,
            record: None,
            action,
            channel: ctx.channel,
            ip_address: ctx.origin.ip_address.clone(),
            user_agent: ctx.origin.user_agent.clone(),
            timestamp,
            success: true,
            details: String::new(),
        }
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn on_record(mut self, record_id: impl Into<String>) -> Self {
        self.record = Some(record_id.into());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    /// Marks a denied attempt.
    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }
}
