// server/src/cli/mod.rs

pub mod cli;
pub mod commands;

pub use cli::{run, start_cli};
pub use commands::CliArgs;
