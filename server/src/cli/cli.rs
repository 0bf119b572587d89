// server/src/cli/cli.rs

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lib::clock::{Clock, SystemClock};
use lib::config::{default_jwt_secret, AppConfig};
use lib::services::{seed, Services};
use lib::storage_engine::create_storage;
use log::{info, warn};
use rest_api::{start_server, AppState};
use security::DigiLockerClient;

use crate::cli::commands::CliArgs;

// CLI entry point for the Ayu Connect server
pub async fn start_cli() -> Result<()> {
    let args = CliArgs::parse();
    run(args).await
}

/// Loads configuration, opens storage, finishes interrupted deletes, seeds
/// demo data when asked and serves the API until shutdown.
pub async fn run(args: CliArgs) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    if config.auth.jwt_secret == default_jwt_secret() {
        warn!("Using the built-in JWT secret; set AYU__AUTH__JWT_SECRET in production");
    }

    let storage = create_storage(&config.storage)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let services = Services::new(storage, &config, clock.clone());

    let purged = services
        .records
        .purge_pending_deletions()
        .await
        .context("failed to purge pending deletions")?;
    info!("Startup purge removed {} tombstoned record(s)", purged);

    if config.seed_demo_data {
        let patient = seed::seed_demo_data(&services.store, clock.now())
            .await
            .context("failed to seed demo data")?;
        info!("Demo patient available as {}", patient.id);
    }

    let provider = Arc::new(DigiLockerClient::new(config.digilocker.clone()));
    let state = AppState::new(config, services, provider);
    start_server(state).await
}
