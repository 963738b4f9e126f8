//! Config command implementation.

use crate::core::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Parse and validate a configuration file.
    Validate,
}

/// Run a config subcommand.
pub fn run_config(config_path: Option<PathBuf>, args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Validate => {
            let path = config_path.context("config validate requires --config")?;
            let config = Config::from_file(&path)?;
            config.validate()?;
            println!(
                "{}: valid ({} node)",
                path.display(),
                if config.node.is_leader() {
                    "leader"
                } else {
                    "follower"
                }
            );
            Ok(())
        }
    }
}
