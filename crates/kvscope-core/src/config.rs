//! Monitor configuration (TOML).
//!
//! ```toml
//! node_timeout_ms = 3000
//! baseline_ttl_secs = 3600
//! output_format = "raw"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8043
//!
//! [[targets]]
//! id = "cache"
//! nodes = ["127.0.0.1:6379"]
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::format::OutputFormat;
use crate::node::{NodeAddress, NodeConnection, Target};
use crate::tcp::TcpNode;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Per-node connect/read/write timeout.
    #[serde(default = "default_node_timeout_ms")]
    pub node_timeout_ms: u64,
    /// Idle CPU baselines older than this are evicted; 0 keeps them forever.
    #[serde(default = "default_baseline_ttl_secs")]
    pub baseline_ttl_secs: u64,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// One monitored deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub id: String,
    /// `host:port` of every member node.
    pub nodes: Vec<String>,
}

fn default_node_timeout_ms() -> u64 {
    3000
}

fn default_baseline_ttl_secs() -> u64 {
    3600
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8043
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            node_timeout_ms: default_node_timeout_ms(),
            baseline_ttl_secs: default_baseline_ttl_secs(),
            output_format: OutputFormat::default(),
            server: ServerConfig::default(),
            targets: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the timeout is non-zero, ids are non-empty and unique, and
    /// every node address parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "node_timeout_ms must be greater than 0".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.id.trim().is_empty() {
                return Err(ConfigError::Invalid("target with empty id".to_string()));
            }
            if !seen.insert(target.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate target id {:?}",
                    target.id
                )));
            }
            target.addresses()?;
        }
        Ok(())
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    /// `None` when eviction is disabled.
    pub fn baseline_ttl(&self) -> Option<Duration> {
        (self.baseline_ttl_secs > 0).then(|| Duration::from_secs(self.baseline_ttl_secs))
    }

    /// Build TCP-backed targets for every configured entry.
    pub fn connect_targets(&self) -> Result<Vec<Target>, ConfigError> {
        self.targets
            .iter()
            .map(|t| t.connect(self.node_timeout()))
            .collect()
    }
}

impl TargetConfig {
    /// Parsed node addresses; fails on an empty list or a bad address.
    pub fn addresses(&self) -> Result<Vec<NodeAddress>, ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "target {:?} has no nodes",
                self.id
            )));
        }
        self.nodes
            .iter()
            .map(|n| {
                n.parse::<NodeAddress>()
                    .map_err(|e| ConfigError::Invalid(format!("target {:?}: {e}", self.id)))
            })
            .collect()
    }

    /// Target whose nodes are [`TcpNode`]s. No connection is opened here.
    pub fn connect(&self, timeout: Duration) -> Result<Target, ConfigError> {
        let nodes = self
            .addresses()?
            .into_iter()
            .map(|addr| Box::new(TcpNode::new(addr, timeout)) as Box<dyn NodeConnection>)
            .collect();
        Ok(Target::new(self.id.clone(), nodes))
    }
}
