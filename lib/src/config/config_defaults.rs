// lib/src/config/config_defaults.rs

use std::path::PathBuf;

use crate::config::config_structs::StorageEngineType;

pub const DEFAULT_CONFIG_PATH: &str = "config/ayu.yaml";
pub const ENV_PREFIX: &str = "AYU";
pub const ENV_SEPARATOR: &str = "__";

pub const DEFAULT_DATA_DIRECTORY: &str = "data";
pub const DEFAULT_UPLOADS_DIRECTORY: &str = "uploads";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}
pub fn default_port() -> u16 { 5000 }
pub fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

pub fn default_storage_engine_type() -> StorageEngineType { StorageEngineType::Sled }
pub fn default_data_directory() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIRECTORY)
}
pub fn default_uploads_directory() -> PathBuf {
    PathBuf::from(DEFAULT_UPLOADS_DIRECTORY)
}

pub fn default_max_file_size() -> u64 { DEFAULT_MAX_FILE_SIZE }

pub fn default_jwt_secret() -> String {
    "change-me-in-production".to_string()
}
pub fn default_jwt_ttl_hours() -> i64 { 24 }
pub fn default_otp_ttl_minutes() -> i64 { 5 }
pub fn default_otp_max_attempts() -> u32 { 3 }

pub fn default_share_ttl_minutes() -> i64 { 30 }
pub fn default_max_ttl_minutes() -> i64 { 7 * 24 * 60 }
pub fn default_expiring_soon_minutes() -> i64 { 5 }
pub fn default_link_hours() -> i64 { 24 }

pub fn default_digilocker_authorize_url() -> String {
    "https://api.digitallocker.gov.in/public/oauth2/1/authorize".to_string()
}
pub fn default_digilocker_token_url() -> String {
    "https://api.digitallocker.gov.in/public/oauth2/1/token".to_string()
}
pub fn default_digilocker_profile_url() -> String {
    "https://api.digitallocker.gov.in/public/oauth2/1/user".to_string()
}
pub fn default_digilocker_redirect_url() -> String {
    "http://localhost:5000/api/digilocker/callback".to_string()
}
