//! Configuration parsing and validation.
//!
//! Filament configuration is loaded from TOML files with CLI overrides.
//! The node's role is derived from the config: an absent or empty
//! `leader_addr` makes the node the leader; a set one makes it a
//! follower dialing that address.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level Filament configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node identity and topology.
    pub node: NodeConfig,

    /// Telemetry and logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Node identity and topology configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address to listen on (e.g. "0.0.0.0:7600").
    pub listen_addr: String,

    /// Leader address to join. Empty or absent means this node IS the
    /// leader.
    #[serde(default)]
    pub leader_addr: Option<String>,
}

impl NodeConfig {
    /// Whether this configuration describes the leader.
    pub fn is_leader(&self) -> bool {
        self.leader_addr.as_deref().map_or(true, str::is_empty)
    }

    /// The upstream leader address, if this node is a follower.
    pub fn upstream(&self) -> Option<&str> {
        self.leader_addr.as_deref().filter(|a| !a.is_empty())
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Build a config directly from addresses (CLI-only operation, no
    /// config file).
    pub fn from_addrs(listen_addr: String, leader_addr: Option<String>) -> Self {
        Self {
            node: NodeConfig {
                listen_addr,
                leader_addr,
            },
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from TOML content.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.node.listen_addr.is_empty() {
            anyhow::bail!("node.listen_addr must not be empty");
        }

        if let Some(upstream) = self.node.upstream() {
            if upstream == self.node.listen_addr {
                anyhow::bail!(
                    "node.leader_addr must differ from node.listen_addr ({})",
                    upstream
                );
            }
        }

        match self.telemetry.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("telemetry.log_level {:?} is not a valid level", other),
        }

        Ok(())
    }
}
