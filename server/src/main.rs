// server/src/main.rs

// Entry point for the Ayu Connect server. Loads `.env`, sets up logging and
// hands over to the CLI.

use anyhow::Result;
use ayu_server::cli::start_cli;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    start_cli().await
}
