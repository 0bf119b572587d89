// models/src/medical/medical_record.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ValidationError, ValidationResult};
use crate::identifiers::new_id;
use crate::medical::access_window::AccessWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    #[serde(rename = "Lab Report")]
    LabReport,
    Prescription,
    Imaging,
    #[serde(rename = "Discharge Summary")]
    DischargeSummary,
    Vaccination,
    Consultation,
    Other,
}

impl RecordType {
    pub const ALL: [RecordType; 7] = [
        RecordType::LabReport,
        RecordType::Prescription,
        RecordType::Imaging,
        RecordType::DischargeSummary,
        RecordType::Vaccination,
        RecordType::Consultation,
        RecordType::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RecordType::LabReport => "Lab Report",
            RecordType::Prescription => "Prescription",
            RecordType::Imaging => "Imaging",
            RecordType::DischargeSummary => "Discharge Summary",
            RecordType::Vaccination => "Vaccination",
            RecordType::Consultation => "Consultation",
            RecordType::Other => "Other",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RecordType {
    type Err = ValidationError;

    /// Case-insensitive; spaces, dashes and underscores are interchangeable,
    /// so `lab-report`, `LAB_REPORT` and `Lab Report` all match.
    fn from_str(s: &str) -> ValidationResult<Self> {
        let normalize = |v: &str| -> String {
            v.chars()
                .filter(|c| !matches!(c, ' ' | '-' | '_'))
                .flat_map(char::to_lowercase)
                .collect()
        };
        let wanted = normalize(s);
        RecordType::ALL
            .into_iter()
            .find(|t| normalize(t.label()) == wanted)
            .ok_or_else(|| ValidationError::UnknownRecordType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantAccess {
    #[default]
    View,
    Download,
}

/// A record shared with one specific, known user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedGrant {
    #[serde(rename = "user")]
    pub grantee: String,
    pub access_type: GrantAccess,
    pub expires_at: AccessWindow,
    pub granted_at: DateTime<Utc>,
}

impl SharedGrant {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        !self.expires_at.is_expired_at(now)
    }
}

/// Reference from a record to one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub file_id: String,
    pub filename: String,
    pub original_name: String,
    pub file_type: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
    pub id: String,
    #[serde(rename = "user")]
    pub owner: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub title: String,
    pub date: NaiveDate,
    pub hospital: Option<String>,
    pub doctor: Option<String>,
    pub notes: Option<String>,
    pub files: Vec<FileAttachment>,
    pub is_emergency_accessible: bool,
    pub is_shared: bool,
    pub shared_with: Vec<SharedGrant>,
    /// Set by the first phase of a delete. Tombstoned records are invisible
    /// to every read and are finished off by the deletion purge.
    pub pending_deletion: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicalRecord {
    pub fn new(owner: impl Into<String>, input: NewMedicalRecord, now: DateTime<Utc>) -> Self {
        MedicalRecord {
            id: new_id(),
            owner: owner.into(),
            record_type: input.record_type,
            title: input.title.trim().to_string(),
            date: input.date,
            hospital: input.hospital,
            doctor: input.doctor,
            notes: input.notes,
            files: Vec::new(),
            is_emergency_accessible: false,
            is_shared: false,
            shared_with: Vec::new(),
            pending_deletion: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner == user_id
    }

    pub fn live_grant_for(&self, user_id: &str, now: DateTime<Utc>) -> Option<&SharedGrant> {
        self.shared_with
            .iter()
            .find(|g| g.grantee == user_id && g.is_live_at(now))
    }

    /// Owner, live grantee, or anybody once the record is emergency-flagged.
    pub fn can_be_read_by(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        self.is_owned_by(user_id)
            || self.live_grant_for(user_id, now).is_some()
            || self.is_emergency_accessible
    }

    pub fn can_be_downloaded_by(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        self.is_owned_by(user_id)
            || self.is_emergency_accessible
            || matches!(
                self.live_grant_for(user_id, now),
                Some(SharedGrant { access_type: GrantAccess::Download, .. })
            )
    }

    /// Adds a grant for `grantee`. A lapsed grant for the same user is
    /// replaced; a live one is rejected so there is at most one per grantee.
    pub fn add_grant(&mut self, grant: SharedGrant, now: DateTime<Utc>) -> ValidationResult<()> {
        if grant.grantee == self.owner {
            return Err(ValidationError::SelfShare);
        }
        if self.live_grant_for(&grant.grantee, now).is_some() {
            return Err(ValidationError::AlreadyShared);
        }
        self.shared_with.retain(|g| g.grantee != grant.grantee);
        self.shared_with.push(grant);
        self.is_shared = true;
        self.updated_at = now;
        Ok(())
    }

    /// Returns whether a grant for `grantee` existed.
    pub fn remove_grant(&mut self, grantee: &str, now: DateTime<Utc>) -> bool {
        let before = self.shared_with.len();
        self.shared_with.retain(|g| g.grantee != grantee);
        self.is_shared = !self.shared_with.is_empty();
        let removed = self.shared_with.len() != before;
        if removed {
            self.updated_at = now;
        }
        removed
    }

    pub fn apply(&mut self, update: RecordUpdate, now: DateTime<Utc>) -> ValidationResult<()> {
        if let Some(title) = update.title {
            if title.trim().is_empty() {
                return Err(ValidationError::MissingField("title"));
            }
            self.title = title.trim().to_string();
        }
        if let Some(record_type) = update.record_type {
            self.record_type = record_type;
        }
        if let Some(date) = update.date {
            self.date = date;
        }
        if update.hospital.is_some() {
            self.hospital = update.hospital;
        }
        if update.doctor.is_some() {
            self.doctor = update.doctor;
        }
        if update.notes.is_some() {
            self.notes = update.notes;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Payload for creating a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMedicalRecord {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub title: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub hospital: Option<String>,
    #[serde(default)]
    pub doctor: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewMedicalRecord {
    pub fn validate(&self) -> ValidationResult<()> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        Ok(())
    }
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    #[serde(default, rename = "type")]
    pub record_type: Option<RecordType>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub hospital: Option<String>,
    #[serde(default)]
    pub doctor: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(now: DateTime<Utc>) -> MedicalRecord {
        MedicalRecord::new(
            "owner-1",
            NewMedicalRecord {
                record_type: RecordType::LabReport,
                title: " CBC ".into(),
                date: NaiveDate::from_ymd_opt(2023, 10, 15).unwrap(),
                hospital: None,
                doctor: None,
                notes: None,
            },
            now,
        )
    }

    fn grant(grantee: &str, window: AccessWindow, now: DateTime<Utc>) -> SharedGrant {
        SharedGrant {
            grantee: grantee.into(),
            access_type: GrantAccess::View,
            expires_at: window,
            granted_at: now,
        }
    }

    #[test]
    fn record_type_parses_loosely() {
        assert_eq!("lab-report".parse::<RecordType>().unwrap(), RecordType::LabReport);
        assert_eq!("DISCHARGE_SUMMARY".parse::<RecordType>().unwrap(), RecordType::DischargeSummary);
        assert!("x-ray".parse::<RecordType>().is_err());
    }

    #[test]
    fn one_live_grant_per_grantee() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut rec = record(now);
        assert_eq!(rec.title, "CBC");

        rec.add_grant(grant("doc", AccessWindow::starting_at(now, 5), now), now).unwrap();
        assert!(rec.is_shared);
        assert_eq!(
            rec.add_grant(grant("doc", AccessWindow::permanent(), now), now),
            Err(ValidationError::AlreadyShared)
        );

        // Once lapsed, the grant can be replaced.
        let later = now + Duration::minutes(6);
        rec.add_grant(grant("doc", AccessWindow::permanent(), later), later).unwrap();
        assert_eq!(rec.shared_with.len(), 1);
        assert!(rec.shared_with[0].expires_at.is_permanent());
    }

    #[test]
    fn read_rules_follow_grants_and_emergency_flag() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut rec = record(now);
        assert!(rec.can_be_read_by("owner-1", now));
        assert!(!rec.can_be_read_by("stranger", now));

        rec.add_grant(grant("doc", AccessWindow::starting_at(now, 1), now), now).unwrap();
        assert!(rec.can_be_read_by("doc", now));
        assert!(!rec.can_be_downloaded_by("doc", now));
        assert!(!rec.can_be_read_by("doc", now + Duration::minutes(1)));

        rec.is_emergency_accessible = true;
        assert!(rec.can_be_read_by("stranger", now));
        assert!(rec.can_be_downloaded_by("stranger", now));
    }

    #[test]
    fn self_share_is_rejected_and_removal_clears_flag() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut rec = record(now);
        assert_eq!(
            rec.add_grant(grant("owner-1", AccessWindow::permanent(), now), now),
            Err(ValidationError::SelfShare)
        );
        rec.add_grant(grant("doc", AccessWindow::permanent(), now), now).unwrap();
        assert!(rec.remove_grant("doc", now));
        assert!(!rec.is_shared);
        assert!(!rec.remove_grant("doc", now));
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut rec = record(now);
        rec.add_grant(grant("doc", AccessWindow::permanent(), now), now).unwrap();
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["user"], "owner-1");
        assert_eq!(json["type"], "Lab Report");
        assert_eq!(json["date"], "2023-10-15");
        assert_eq!(json["isEmergencyAccessible"], false);
        assert_eq!(json["sharedWith"][0]["user"], "doc");
        assert_eq!(json["sharedWith"][0]["accessType"], "view");
        assert!(json["sharedWith"][0]["expiresAt"].is_null());
    }
}
