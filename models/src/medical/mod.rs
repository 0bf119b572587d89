// models/src/medical/mod.rs

pub mod access_log;
pub mod access_token;
pub mod access_window;
pub mod medical_record;
pub mod stored_file;
pub mod user;

pub use access_log::{AccessAction, AccessChannel, AccessContext, AccessLogEntry, RequestOrigin};
pub use access_token::{
    AccessEvent, AccessToken, EmergencyDetails, ExtensionRequest, TokenKind, TokenState, TokenUnusable,
};
pub use access_window::AccessWindow;
pub use medical_record::{
    FileAttachment, GrantAccess, MedicalRecord, NewMedicalRecord, RecordType, RecordUpdate, SharedGrant,
};
pub use stored_file::{validate_upload, StoredFile, ALLOWED_EXTENSIONS, ALLOWED_MIME_TYPES};
pub use user::{Identity, User, UserProfile};
