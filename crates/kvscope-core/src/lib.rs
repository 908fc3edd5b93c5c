//! # kvscope-core
//!
//! **One health snapshot for every node of a key-value deployment.**
//!
//! `kvscope-core` polls each member of a target (a single server or a whole
//! cluster) with `INFO`, parses the sectioned text, and folds the per-node
//! numbers into one [`OverviewRecord`]: version, key count, memory, clients,
//! throughput and a CPU percentage computed against the previous poll.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kvscope_core::{MonitorConfig, OverviewAggregator};
//!
//! let config = MonitorConfig::load("kvscope.toml").unwrap();
//! let targets = config.connect_targets().unwrap();
//! let aggregator = OverviewAggregator::default();
//!
//! for target in &targets {
//!     let record = aggregator.get_target_overview(target).unwrap();
//!     println!("{}: {:?} keys", target.id, record.total_keys);
//! }
//! ```
//!
//! ## Architecture
//!
//! Nodes → `INFO` (parallel) → [`parse_info`] → reducers → [`OverviewRecord`]
//!
//! CPU usage needs two polls. The [`CpuTracker`] keeps the last sample of
//! every node per target; the first poll of a target reports `None`.
//!
//! Arbitrary command replies go through a [`ReplyFormatter`]:
//! - **Raw** (default): same shape as the reply, bulk payloads as text.
//! - **Text**: redis-cli style rendering.
//!
//! Every node implements the [`NodeConnection`] trait. [`TcpNode`] sends
//! commands through the `redis` client and maps its replies into
//! [`ReplyValue`].

pub mod config;
pub mod cpu;
pub mod error;
pub mod format;
pub mod info;
pub mod node;
pub mod overview;
pub mod reply;
pub mod tcp;

pub use config::{MonitorConfig, ServerConfig, TargetConfig};
pub use cpu::{CpuSample, CpuTracker, TargetBaseline, TargetGuard};
pub use error::{ConfigError, ConnectionError};
pub use format::{
    OutputFormat, RawFormatter, ReplyFormatter, TextFormatter, normalize, render,
};
pub use info::{InfoFields, InfoSections, parse_info, parse_int_prefix, parse_pairs};
pub use node::{NodeAddress, NodeConnection, NodeInfo, Target, sample_all, sample_node};
pub use overview::{OverviewAggregator, OverviewRecord, median};
pub use reply::ReplyValue;
pub use tcp::{DEFAULT_TIMEOUT, TcpNode};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
