//! Start command implementation.

use crate::cache::{Cache, MemoryCache};
use crate::core::config::Config;
use crate::node::Node;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Start a cache node.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Address to listen on. Overrides the config file.
    #[arg(long)]
    pub listen_addr: Option<String>,

    /// Leader address to join as a follower. Overrides the config file;
    /// empty means this node is the leader.
    #[arg(long)]
    pub leader_addr: Option<String>,
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Resolve the effective configuration from the optional file plus CLI
/// overrides. A listen address must come from one of the two.
fn resolve_config(
    config_path: Option<&PathBuf>,
    args: &StartArgs,
    log_level: Option<&str>,
) -> Result<Config> {
    let mut config = match config_path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let listen_addr = args
                .listen_addr
                .clone()
                .context("either --config or --listen-addr is required")?;
            Config::from_addrs(listen_addr, args.leader_addr.clone())
        }
    };

    if let Some(listen_addr) = &args.listen_addr {
        config.node.listen_addr = listen_addr.clone();
    }
    if let Some(leader_addr) = &args.leader_addr {
        config.node.leader_addr = Some(leader_addr.clone());
    }
    if let Some(level) = log_level {
        config.telemetry.log_level = level.to_string();
    }

    config.validate()?;
    Ok(config)
}

/// Run the start command: build the cache and node, serve until the node
/// stops. A follower losing its leader surfaces here as an error, which
/// becomes a non-zero exit.
pub async fn run_start(
    config_path: Option<PathBuf>,
    args: StartArgs,
    log_level: Option<String>,
) -> Result<()> {
    let config = resolve_config(config_path.as_ref(), &args, log_level.as_deref())?;
    init_tracing(&config.telemetry.log_level);

    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let node = Arc::new(Node::new(&config.node, cache, shutdown_rx));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("shutdown signal received (SIGINT)");
            let _ = shutdown_tx.send(true);
        }
    });

    node.run().await.context("node stopped")
}
