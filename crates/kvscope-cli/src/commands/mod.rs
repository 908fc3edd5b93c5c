pub mod check_config;
pub mod exec;
pub mod info;
pub mod overview;
pub mod server;

use std::time::Duration;

use kvscope_core::{MonitorConfig, NodeAddress, TargetConfig, TcpNode};

/// Print an error and exit non-zero.
pub fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

pub fn timeout(timeout_ms: u64) -> Duration {
    Duration::from_millis(timeout_ms)
}

/// Parse a `host:port` argument.
pub fn parse_node(s: &str) -> Result<NodeAddress, String> {
    s.trim().parse()
}

/// Single-node connection from a CLI argument, exiting on a bad address.
pub fn connect_node(s: &str, timeout_ms: u64) -> TcpNode {
    match parse_node(s) {
        Ok(addr) => TcpNode::new(addr, timeout(timeout_ms)),
        Err(e) => fail(e),
    }
}

/// Target config from `--node` arguments, dropping empty entries.
pub fn adhoc_target(id: &str, nodes: &[String]) -> TargetConfig {
    TargetConfig {
        id: id.to_string(),
        nodes: nodes
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect(),
    }
}

/// Load a config file, or defaults when no path is given.
pub fn load_config(path: Option<&str>) -> MonitorConfig {
    match path {
        Some(p) => MonitorConfig::load(p).unwrap_or_else(|e| fail(format!("{p}: {e}"))),
        None => MonitorConfig::default(),
    }
}
