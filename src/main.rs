//! Filament - unified CLI entrypoint.
//!
//! Usage:
//!   filament start --listen-addr 0.0.0.0:7600
//!   filament start --listen-addr 0.0.0.0:7601 --leader-addr leader:7600
//!   filament start --config config/filament.toml
//!   filament config validate --config config/filament.toml

use anyhow::Result;
use clap::Parser;
use filament::cli::commands::{run_config, run_start};
use filament::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.map(PathBuf::from);

    match cli.command {
        Commands::Start(args) => run_start(config_path, args, cli.log_level).await,
        Commands::Config(args) => run_config(config_path, args),
    }
}
