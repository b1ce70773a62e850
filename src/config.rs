//! Node configuration read from the environment (and `.env`, when present)

use std::env;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while reading the configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

pub const HOST_VAR: &str = "SPECTRUM_HOST";
pub const PORT_VAR: &str = "SPECTRUM_PORT";
pub const NODE_ID_VAR: &str = "SPECTRUM_NODE_ID";
pub const PEER_TIMEOUT_VAR: &str = "SPECTRUM_PEER_TIMEOUT_MS";
pub const MINING_DEADLINE_VAR: &str = "SPECTRUM_MINING_DEADLINE_SECS";
pub const PEERS_VAR: &str = "SPECTRUM_PEERS";

#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    /// Identifier of this node; receives the mining rewards
    pub node_id: String,
    /// Upper bound on each peer fetch during conflict resolution
    pub peer_timeout: Duration,
    /// Upper bound on a single proof search, unbounded when absent
    pub mining_deadline: Option<Duration>,
    /// Peers registered at startup
    pub bootstrap_peers: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            node_id: Uuid::new_v4().simple().to_string(),
            peer_timeout: Duration::from_millis(5000),
            mining_deadline: None,
            bootstrap_peers: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Loads `.env` if there is one, then reads the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source; unset keys keep their default
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = NodeConfig::default();

        if let Some(host) = lookup(HOST_VAR) {
            config.host = host;
        }
        if let Some(port) = lookup(PORT_VAR) {
            config.port = parse(PORT_VAR, &port)?;
        }
        if let Some(node_id) = lookup(NODE_ID_VAR).filter(|id| !id.trim().is_empty()) {
            config.node_id = node_id;
        }
        if let Some(timeout) = lookup(PEER_TIMEOUT_VAR) {
            config.peer_timeout = Duration::from_millis(parse(PEER_TIMEOUT_VAR, &timeout)?);
        }
        if let Some(deadline) = lookup(MINING_DEADLINE_VAR) {
            config.mining_deadline = Some(Duration::from_secs(parse(MINING_DEADLINE_VAR, &deadline)?));
        }
        if let Some(peers) = lookup(PEERS_VAR) {
            config.bootstrap_peers = peers
                .split(',')
                .map(str::trim)
                .filter(|peer| !peer.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
