// models/src/medical/stored_file.rs

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ValidationError, ValidationResult};
use crate::identifiers::new_id;
use crate::medical::medical_record::FileAttachment;

pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpeg", "jpg", "png", "gif", "pdf", "doc", "docx", "xls", "xlsx", "txt", "csv", "ppt", "pptx",
];

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
    "text/csv",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Both the extension and the declared mime type must be on the allow-lists.
pub fn validate_upload(original_name: &str, content_type: &str) -> ValidationResult<()> {
    let ext_ok = extension_of(original_name)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false);
    let mime_ok = ALLOWED_MIME_TYPES.contains(&content_type.to_ascii_lowercase().as_str());
    if ext_ok && mime_ok {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedFileType)
    }
}

/// Metadata row for an uploaded file. The bytes live in blob storage under
/// `(owner, filename)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: String,
    pub record: String,
    #[serde(rename = "user")]
    pub owner: String,
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub size: u64,
    pub upload_date: DateTime<Utc>,
}

impl StoredFile {
    pub fn new(
        owner: impl Into<String>,
        record: impl Into<String>,
        original_name: &str,
        content_type: &str,
        size: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let id = new_id();
        let filename = match extension_of(original_name) {
            Some(ext) => format!("{}.{}", id, ext),
            None => id.clone(),
        };
        StoredFile {
            id,
            record: record.into(),
            owner: owner.into(),
            filename,
            original_name: original_name.to_string(),
            content_type: content_type.to_string(),
            size,
            upload_date: now,
        }
    }

    pub fn attachment(&self) -> FileAttachment {
        FileAttachment {
            file_id: self.id.clone(),
            filename: self.filename.clone(),
            original_name: self.original_name.clone(),
            file_type: self.content_type.clone(),
            file_size: self.size,
        }
    }
}
