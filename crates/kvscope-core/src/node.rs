//! Node connections and status sampling.
//!
//! Every monitored node implements the [`NodeConnection`] trait. A
//! [`Target`] groups the nodes of one logical deployment: a standalone server
//! has one node, a cluster has one per shard member.

use std::fmt;
use std::str::FromStr;

use crate::error::ConnectionError;
use crate::info::{InfoSections, parse_info};
use crate::reply::ReplyValue;

/// Advertised address of a node, used as its id (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Node id as stored in CPU baselines.
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = String;

    /// Accepts `host:port` and bracketed IPv6 `[::1]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("missing port in node address {s:?}"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(format!("missing host in node address {s:?}"));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| format!("bad port in node address {s:?}"))?;
        Ok(Self::new(host, port))
    }
}

/// Trait that every node connection must implement.
///
/// Connection management (pooling, auth, timeouts, retries) lives behind
/// this trait; a failed or timed out call surfaces as a [`ConnectionError`].
pub trait NodeConnection: Send + Sync {
    /// Advertised host/port of the node.
    fn address(&self) -> &NodeAddress;

    /// Run one command and return its raw reply.
    fn command(&self, args: &[&str]) -> Result<ReplyValue, ConnectionError>;

    /// Raw `INFO` status text.
    fn info(&self) -> Result<String, ConnectionError> {
        match self.command(&["INFO"])? {
            ReplyValue::Error(message) => Err(ConnectionError::Server {
                node: self.address().id(),
                message,
            }),
            reply => reply
                .as_text()
                .ok_or_else(|| ConnectionError::UnexpectedReply {
                    node: self.address().id(),
                    command: "INFO".to_string(),
                }),
        }
    }
}

/// Parsed status of one node plus its address.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub address: NodeAddress,
    pub sections: InfoSections,
}

impl NodeInfo {
    /// Shorthand for `self.sections.get(section, field)`.
    pub fn get(&self, section: &str, field: &str) -> Option<&str> {
        self.sections.get(section, field)
    }

    /// Whether the node reports the primary replication role.
    pub fn is_primary(&self) -> bool {
        self.get("replication", "role") == Some("master")
    }
}

/// A logical monitored deployment.
pub struct Target {
    pub id: String,
    pub nodes: Vec<Box<dyn NodeConnection>>,
}

impl Target {
    pub fn new(id: impl Into<String>, nodes: Vec<Box<dyn NodeConnection>>) -> Self {
        Self {
            id: id.into(),
            nodes,
        }
    }

    /// Find a member node by its `host:port` id.
    pub fn node(&self, id: &str) -> Option<&dyn NodeConnection> {
        self.nodes
            .iter()
            .find(|n| n.address().id() == id)
            .map(|n| &**n)
    }

    /// Member node ids in configuration order.
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.address().id()).collect()
    }
}

/// Fetch and parse the status of a single node.
pub fn sample_node(conn: &dyn NodeConnection) -> Result<NodeInfo, ConnectionError> {
    let raw = conn.info()?;
    Ok(NodeInfo {
        address: conn.address().clone(),
        sections: parse_info(&raw),
    })
}

/// Sample every node in parallel, one scoped thread per node.
///
/// All nodes must answer: the first failure (in node order) is returned and
/// the successful samples are discarded. Results keep node order.
pub fn sample_all(nodes: &[Box<dyn NodeConnection>]) -> Result<Vec<NodeInfo>, ConnectionError> {
    if let [single] = nodes {
        return sample_node(single.as_ref()).map(|info| vec![info]);
    }

    let results: Vec<Result<NodeInfo, ConnectionError>> = std::thread::scope(|s| {
        let handles: Vec<_> = nodes
            .iter()
            .map(|conn| s.spawn(move || sample_node(conn.as_ref())))
            .collect();

        handles
            .into_iter()
            .zip(nodes)
            .map(|(handle, conn)| {
                handle.join().unwrap_or_else(|_| {
                    Err(ConnectionError::Protocol {
                        node: conn.address().id(),
                        message: "sampling thread panicked".to_string(),
                    })
                })
            })
            .collect()
    });

    results.into_iter().collect()
}
