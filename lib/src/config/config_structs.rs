// lib/src/config/config_structs.rs

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::config_defaults::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngineType {
    #[serde(alias = "inmemory", alias = "in-memory")]
    Memory,
    Sled,
}

impl fmt::Display for StorageEngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageEngineType::Memory => write!(f, "memory"),
            StorageEngineType::Sled => write!(f, "sled"),
        }
    }
}

impl FromStr for StorageEngineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" => Ok(StorageEngineType::Memory),
            "sled" => Ok(StorageEngineType::Sled),
            other => Err(format!("unknown storage engine '{}', expected memory or sled", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub engine: StorageEngineType,
    /// Sled database directory.
    pub data_directory: PathBuf,
    /// Root for uploaded file blobs, one sub-directory per owner.
    pub uploads_directory: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            engine: default_storage_engine_type(),
            data_directory: default_data_directory(),
            uploads_directory: default_uploads_directory(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig { max_file_size: default_max_file_size() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub otp_ttl_minutes: i64,
    pub otp_max_attempts: u32,
    /// Echo freshly issued OTP codes in the response. Development only.
    pub expose_dev_otp: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            jwt_secret: default_jwt_secret(),
            jwt_ttl_hours: default_jwt_ttl_hours(),
            otp_ttl_minutes: default_otp_ttl_minutes(),
            otp_max_attempts: default_otp_max_attempts(),
            expose_dev_otp: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharingConfig {
    pub default_ttl_minutes: i64,
    pub max_ttl_minutes: i64,
    /// Width of the window before expiry in which a token reports
    /// `EXPIRING_SOON`.
    pub expiring_soon_minutes: i64,
    pub default_link_hours: i64,
}

impl Default for SharingConfig {
    fn default() -> Self {
        SharingConfig {
            default_ttl_minutes: default_share_ttl_minutes(),
            max_ttl_minutes: default_max_ttl_minutes(),
            expiring_soon_minutes: default_expiring_soon_minutes(),
            default_link_hours: default_link_hours(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigiLockerConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
}

impl Default for DigiLockerConfig {
    fn default() -> Self {
        DigiLockerConfig {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: default_digilocker_redirect_url(),
            authorize_url: default_digilocker_authorize_url(),
            token_url: default_digilocker_token_url(),
            profile_url: default_digilocker_profile_url(),
        }
    }
}

/// Full service configuration. Every section falls back to its defaults
/// when missing from the YAML file and the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Base used when rendering access URLs for share and emergency tokens.
    pub public_base_url: String,
    pub storage: StorageConfig,
    pub uploads: UploadConfig,
    pub auth: AuthConfig,
    pub sharing: SharingConfig,
    pub digilocker: DigiLockerConfig,
    pub seed_demo_data: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig::default(),
            public_base_url: default_public_base_url(),
            storage: StorageConfig::default(),
            uploads: UploadConfig::default(),
            auth: AuthConfig::default(),
            sharing: SharingConfig::default(),
            digilocker: DigiLockerConfig::default(),
            seed_demo_data: false,
        }
    }
}
