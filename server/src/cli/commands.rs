// server/src/cli/commands.rs

// Command-line arguments for the Ayu Connect server, parsed with `clap`.
// Every flag is optional and overrides the loaded configuration.
use clap::Parser;
use lib::config::{AppConfig, StorageEngineType};
use std::path::PathBuf;

#[derive(Parser, Debug, PartialEq)]
#[command(name = "ayu-connect")]
#[command(version = "0.1.0")]
#[command(about = "Medical records sharing server")]
pub struct CliArgs {
    /// YAML configuration file. Defaults to config/ayu.yaml when present.
    #[clap(long, short = 'c', env = "AYU_CONFIG")]
    pub config: Option<PathBuf>,
    #[clap(long)]
    pub host: Option<String>,
    #[clap(long, short = 'p')]
    pub port: Option<u16>,
    /// Storage engine: memory or sled.
    #[clap(long, value_name = "ENGINE")]
    pub storage: Option<StorageEngineType>,
    #[clap(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
    #[clap(long, value_name = "DIR")]
    pub uploads_dir: Option<PathBuf>,
    /// Create the demo patient and its records on startup.
    #[clap(long)]
    pub seed_demo: bool,
}

impl CliArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(engine) = self.storage {
            config.storage.engine = engine;
        }
        if let Some(dir) = &self.data_dir {
            config.storage.data_directory = dir.clone();
        }
        if let Some(dir) = &self.uploads_dir {
            config.storage.uploads_directory = dir.clone();
        }
        if self.seed_demo {
            config.seed_demo_data = true;
        }
    }
}
