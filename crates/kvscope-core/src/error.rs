//! Error types shared by the kvscope crates.
//!
//! Only [`ConnectionError`] is fatal to an overview request. Malformed metric
//! values never surface here; the aggregator degrades them to `None` field by
//! field instead.

use std::io;

use redis::RedisError;

/// A node failed to answer a command.
///
/// Every variant carries the `host:port` id of the node that failed so a
/// fan-out failure can be attributed without extra context.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("{node}: i/o error: {source}")]
    Io {
        node: String,
        #[source]
        source: RedisError,
    },
    #[error("{node}: timed out")]
    Timeout { node: String },
    #[error("{node}: protocol error: {message}")]
    Protocol { node: String, message: String },
    /// The node answered with an error reply (`-ERR ...`).
    #[error("{node}: server error: {message}")]
    Server { node: String, message: String },
    #[error("{node}: unexpected reply to {command}")]
    UnexpectedReply { node: String, command: String },
}

impl ConnectionError {
    /// Id (`host:port`) of the node this error belongs to.
    pub fn node(&self) -> &str {
        match self {
            Self::Io { node, .. }
            | Self::Timeout { node }
            | Self::Protocol { node, .. }
            | Self::Server { node, .. }
            | Self::UnexpectedReply { node, .. } => node,
        }
    }

    /// Attach a node id to a client error.
    ///
    /// Read and connect timeouts become [`ConnectionError::Timeout`]. Errors
    /// carrying a reply code (failed handshake) become
    /// [`ConnectionError::Server`].
    pub fn from_redis(node: &str, err: RedisError) -> Self {
        let node = node.to_string();
        if err.is_timeout() {
            Self::Timeout { node }
        } else if err.is_io_error() {
            Self::Io { node, source: err }
        } else if let Some(code) = err.code() {
            let message = match err.detail() {
                Some(detail) => format!("{code} {detail}"),
                None => code.to_string(),
            };
            Self::Server { node, message }
        } else {
            Self::Protocol {
                node,
                message: err.to_string(),
            }
        }
    }
}

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
