// lib/src/config/mod.rs

pub mod config_defaults;
pub mod config_structs;

use std::path::Path;

use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use log::{debug, info};

pub use config_defaults::*;
pub use config_structs::*;

impl AppConfig {
    /// Layers built-in defaults, then the YAML file, then `AYU__*`
    /// environment variables (`AYU__SERVER__PORT=8080`).
    ///
    /// An explicitly given path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_source = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_PATH).required(false),
        };
        debug!("Loading configuration from {:?}", path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH)));

        let settings = Config::builder()
            .add_source(file_source)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration sources")?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        info!(
            "Configuration loaded: engine={}, listen={}:{}",
            config.storage.engine, config.server.host, config.server.port
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn should_fill_missing_sections_with_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "server:\n  port: 9090\nsharing:\n  max_ttl_minutes: 60\nseed_demo_data: true"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, default_host());
        assert_eq!(config.sharing.max_ttl_minutes, 60);
        assert_eq!(config.sharing.default_link_hours, 24);
        assert_eq!(config.uploads.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert!(config.seed_demo_data);
    }

    #[test]
    fn should_reject_missing_explicit_file() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/ayu.yaml"))).is_err());
    }

    #[test]
    fn should_parse_engine_names() {
        assert_eq!("Sled".parse::<StorageEngineType>().unwrap(), StorageEngineType::Sled);
        assert_eq!("in-memory".parse::<StorageEngineType>().unwrap(), StorageEngineType::Memory);
        assert!("rocksdb".parse::<StorageEngineType>().is_err());
    }
}
