//! Configuration management for SwarmLink.
//!
//! Configuration is a TOML file; every section and field has a default so a
//! partial file (or none at all) is valid.
//!
//! ```toml
//! [node]
//! node_id = "drone-3"
//!
//! [network]
//! command_port = 10101
//! advertise_address = "192.168.1.13"
//!
//! [broadcast]
//! tick_ms = 100
//! heartbeat_period_ticks = 10
//! ```

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::codec::DEFAULT_MAX_FRAME_LEN;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    /// File is not valid TOML for this schema
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Values are out of range or inconsistent
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Role of this process
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Autonomous field unit
    #[default]
    Unit,
    /// Control console
    Console,
}

/// Identity of this process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identifier announced in handshakes and beacons
    pub node_id: String,
    /// Unit or console
    pub role: NodeRole,
    /// Behaviors offered by this unit
    pub behaviors: Vec<String>,
    /// Motor controllers offered by this unit
    pub controllers: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node-001".to_string(),
            role: NodeRole::Unit,
            behaviors: Vec::new(),
            controllers: Vec::new(),
        }
    }
}

/// Network endpoints and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the command listener binds to
    pub bind_address: IpAddr,
    /// TCP port for commands and queries
    pub command_port: u16,
    /// UDP port for beacons
    pub broadcast_port: u16,
    /// Address announced to peers; auto-detected when absent
    pub advertise_address: Option<IpAddr>,
    /// Time allowed for the identification frame
    pub handshake_timeout_ms: u64,
    /// Time allowed for one outbound delivery (connect, handshake, write)
    pub connect_timeout_ms: u64,
    /// Largest accepted frame body
    pub max_frame_len: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            command_port: 10101,
            broadcast_port: 8888,
            advertise_address: None,
            handshake_timeout_ms: 5_000,
            connect_timeout_ms: 2_000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl NetworkConfig {
    /// Handshake window
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Outbound delivery bound
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Beacon schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Whether this process emits beacons
    pub enabled: bool,
    /// Control loop period
    pub tick_ms: u64,
    /// Ticks between heartbeats
    pub heartbeat_period_ticks: u64,
    /// Ticks between position beacons
    pub position_period_ticks: u64,
    /// Ticks between shared entity beacons
    pub shared_entity_period_ticks: u64,
    /// Console: drop units not heard from for this long
    pub stale_after_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_ms: 100,
            heartbeat_period_ticks: 10,
            position_period_ticks: 5,
            shared_entity_period_ticks: 20,
            stale_after_ms: 10_000,
        }
    }
}

impl BroadcastConfig {
    /// Control loop period
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Logging output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// File receiving `log` messages; traced only when absent
    pub sink_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            sink_path: None,
        }
    }
}

/// Complete process configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity
    pub node: NodeConfig,
    /// Endpoints and timeouts
    pub network: NetworkConfig,
    /// Beacon schedule
    pub broadcast: BroadcastConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Check ranges and consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.node_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "node.node_id must not be empty".to_string(),
            ));
        }
        if self.network.handshake_timeout_ms == 0 || self.network.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "network timeouts must be greater than zero".to_string(),
            ));
        }
        if self.network.max_frame_len < 64 {
            return Err(ConfigError::ValidationError(format!(
                "network.max_frame_len {} is too small",
                self.network.max_frame_len
            )));
        }
        let b = &self.broadcast;
        if b.tick_ms == 0 {
            return Err(ConfigError::ValidationError(
                "broadcast.tick_ms must be greater than zero".to_string(),
            ));
        }
        if b.heartbeat_period_ticks == 0
            || b.position_period_ticks == 0
            || b.shared_entity_period_ticks == 0
        {
            return Err(ConfigError::ValidationError(
                "broadcast periods must be at least one tick".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.network.command_port, 10101);
        assert_eq!(config.broadcast.tick_ms, 100);
        assert_eq!(config.node.role, NodeRole::Unit);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
            [node]
            node_id = "console"
            role = "console"

            [network]
            advertise_address = "192.168.1.2"
            "#,
        )
        .unwrap();

        assert_eq!(config.node.node_id, "console");
        assert_eq!(config.node.role, NodeRole::Console);
        assert_eq!(
            config.network.advertise_address,
            Some("192.168.1.2".parse().unwrap())
        );
        assert_eq!(config.network.broadcast_port, 8888);
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let err = Config::from_toml("[broadcast]\nposition_period_ticks = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_blank_node_id_is_rejected() {
        assert!(Config::from_toml("[node]\nnode_id = \"  \"\n").is_err());
    }
}
