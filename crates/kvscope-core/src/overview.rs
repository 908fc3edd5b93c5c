//! Point-in-time overview of a target.
//!
//! Architecture:
//! 1. Lock the target's CPU baseline slot (one poll per target at a time)
//! 2. Sample every node in parallel, fail-fast
//! 3. Reduce the samples metric by metric
//! 4. Feed CPU counters to the tracker and attach its figure
//!
//! Reduction rules:
//!
//! | Field               | Source                              | Rule   | Nodes         |
//! |---------------------|-------------------------------------|--------|---------------|
//! | `version`           | `server.redis_version`              | first  | first node    |
//! | `total_keys`        | `keyspace.db*` `keys=` pairs        | sum    | primaries     |
//! | `used_memory_bytes` | `memory.used_memory`                | sum    | primaries     |
//! | `connected_clients` | `clients.connected_clients`         | median | all           |
//! | `ops_per_second`    | `stats.instantaneous_ops_per_sec`   | sum    | all           |
//! | `network_in_kbps`   | `stats.instantaneous_input_kbps`    | sum    | all           |
//! | `network_out_kbps`  | `stats.instantaneous_output_kbps`   | sum    | all           |
//! | `cpu_usage_percent` | `cpu.*`, `server.uptime_in_seconds` | delta  | all           |

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cpu::{CpuSample, CpuTracker};
use crate::error::ConnectionError;
use crate::info::{parse_int_prefix, parse_pairs};
use crate::node::{NodeConnection, NodeInfo, Target, sample_all};

/// Aggregated overview of one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewRecord {
    pub version: Option<String>,
    pub total_keys: Option<u64>,
    pub used_memory_bytes: Option<u64>,
    pub connected_clients: f64,
    pub ops_per_second: i64,
    pub network_in_kbps: i64,
    pub network_out_kbps: i64,
    pub cpu_usage_percent: Option<f64>,
}

impl OverviewRecord {
    /// Reduce parsed node samples. `cpu_usage_percent` comes from the
    /// tracker and is passed through unchanged.
    pub fn from_nodes(nodes: &[NodeInfo], cpu_usage_percent: Option<f64>) -> Self {
        Self {
            version: version(nodes),
            total_keys: total_keys(nodes),
            used_memory_bytes: used_memory(nodes),
            connected_clients: connected_clients(nodes),
            ops_per_second: sum_field(nodes, "stats", "instantaneous_ops_per_sec"),
            network_in_kbps: sum_field(nodes, "stats", "instantaneous_input_kbps"),
            network_out_kbps: sum_field(nodes, "stats", "instantaneous_output_kbps"),
            cpu_usage_percent,
        }
    }
}

/// Builds overview records and owns the CPU baselines they depend on.
pub struct OverviewAggregator {
    tracker: Arc<CpuTracker>,
}

impl Default for OverviewAggregator {
    fn default() -> Self {
        Self::new(Arc::new(CpuTracker::new()))
    }
}

impl OverviewAggregator {
    pub fn new(tracker: Arc<CpuTracker>) -> Self {
        Self { tracker }
    }

    /// Baseline store shared with this aggregator.
    pub fn tracker(&self) -> &Arc<CpuTracker> {
        &self.tracker
    }

    /// Poll `nodes` and reduce them into one record.
    ///
    /// Any node failing fails the whole call and leaves the CPU baseline of
    /// `target_id` untouched.
    pub fn get_overview(
        &self,
        target_id: &str,
        nodes: &[Box<dyn NodeConnection>],
    ) -> Result<OverviewRecord, ConnectionError> {
        let mut slot = self.tracker.lock_target(target_id);

        let infos = match sample_all(nodes) {
            Ok(infos) => infos,
            Err(e) => {
                log::warn!("overview of {target_id} failed: {e}");
                return Err(e);
            }
        };
        log::debug!("sampled {} node(s) of {target_id}", infos.len());

        let samples: Vec<CpuSample> = infos.iter().filter_map(CpuSample::from_info).collect();
        if samples.len() < infos.len() {
            log::debug!(
                "{} node(s) of {target_id} report no CPU counters",
                infos.len() - samples.len()
            );
        }
        let cpu = slot.update(samples);

        Ok(OverviewRecord::from_nodes(&infos, cpu))
    }

    /// [`get_overview`](Self::get_overview) for a configured target.
    pub fn get_target_overview(&self, target: &Target) -> Result<OverviewRecord, ConnectionError> {
        self.get_overview(&target.id, &target.nodes)
    }
}

/// Median: empty → 0, odd count → middle value, even → mean of the two
/// middle values. Sorts `values` in place.
pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

fn version(nodes: &[NodeInfo]) -> Option<String> {
    nodes
        .first()?
        .get("server", "redis_version")
        .map(str::to_string)
}

/// Integer field for sum/median metrics: absent or unparsable counts as 0.
fn lenient_int(node: &NodeInfo, section: &str, field: &str) -> i64 {
    match node.get(section, field) {
        None => 0,
        Some(raw) => parse_int_prefix(raw).unwrap_or_else(|| {
            log::debug!("{}: unparsable {section}.{field} {raw:?}", node.address);
            0
        }),
    }
}

/// Saturates instead of wrapping.
fn sum_field(nodes: &[NodeInfo], section: &str, field: &str) -> i64 {
    nodes
        .iter()
        .map(|n| lenient_int(n, section, field))
        .fold(0i64, i64::saturating_add)
}

fn connected_clients(nodes: &[NodeInfo]) -> f64 {
    let mut values: Vec<f64> = nodes
        .iter()
        .map(|n| lenient_int(n, "clients", "connected_clients") as f64)
        .collect();
    median(&mut values)
}

fn strict_count(raw: &str) -> Option<u64> {
    u64::try_from(parse_int_prefix(raw)?).ok()
}

/// `None` if any term is `None` or the total does not fit a `u64`.
fn checked_total(terms: impl IntoIterator<Item = Option<u64>>) -> Option<u64> {
    terms
        .into_iter()
        .try_fold(0u64, |acc, term| acc.checked_add(term?))
}

fn used_memory(nodes: &[NodeInfo]) -> Option<u64> {
    checked_total(
        nodes
            .iter()
            .filter(|n| n.is_primary())
            .map(|n| match n.get("memory", "used_memory") {
                None => Some(0),
                Some(raw) => strict_count(raw),
            }),
    )
}

fn total_keys(nodes: &[NodeInfo]) -> Option<u64> {
    checked_total(nodes.iter().filter(|n| n.is_primary()).map(node_keys))
}

/// Keys of one node: sum of `keys=` over every keyspace db line.
fn node_keys(node: &NodeInfo) -> Option<u64> {
    let Some(keyspace) = node.sections.section("keyspace") else {
        return Some(0);
    };
    checked_total(keyspace.values().map(|db| {
        let pairs = parse_pairs(db, ',', '=');
        let keys = pairs.get("keys").and_then(|k| strict_count(k));
        if keys.is_none() {
            log::debug!("{}: malformed keyspace entry {db:?}", node.address);
        }
        keys
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::parse_info;
    use crate::node::NodeAddress;
    use crate::node::tests::MockNode;

    fn node(addr: &str, text: &str) -> NodeInfo {
        NodeInfo {
            address: addr.parse::<NodeAddress>().unwrap(),
            sections: parse_info(text),
        }
    }

    fn primary(addr: &str, extra: &str) -> NodeInfo {
        node(addr, &format!("# Replication\nrole:master\n{extra}"))
    }

    fn replica(addr: &str, extra: &str) -> NodeInfo {
        node(addr, &format!("# Replication\nrole:slave\n{extra}"))
    }

    fn info_text(version: &str, sys: f64, user: f64, uptime: u64, role: &str) -> String {
        format!(
            "# Server\r\nredis_version:{version}\r\nuptime_in_seconds:{uptime}\r\n\r\n\
             # Clients\r\nconnected_clients:4\r\n\r\n\
             # Memory\r\nused_memory:1000\r\n\r\n\
             # Stats\r\ninstantaneous_ops_per_sec:10\r\ninstantaneous_input_kbps:1.5\r\n\
             instantaneous_output_kbps:2.9\r\n\r\n\
             # Replication\r\nrole:{role}\r\n\r\n\
             # CPU\r\nused_cpu_sys:{sys}\r\nused_cpu_user:{user}\r\n\r\n\
             # Keyspace\r\ndb0:keys=7,expires=0,avg_ttl=0\r\n"
        )
    }

    // -----------------------------------------------------------------------
    // Median
    // -----------------------------------------------------------------------

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), 0.0);
        assert_eq!(median(&mut [5.0]), 5.0);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    // -----------------------------------------------------------------------
    // Reducers
    // -----------------------------------------------------------------------

    #[test]
    fn test_used_memory_primaries_only() {
        let nodes = vec![
            primary("a:1", "# Memory\nused_memory:100\n"),
            primary("b:2", "# Memory\nused_memory:200\n"),
            replica("c:3", "# Memory\nused_memory:50\n"),
        ];
        assert_eq!(used_memory(&nodes), Some(300));
    }

    #[test]
    fn test_used_memory_malformed_is_none() {
        let nodes = vec![
            primary("a:1", "# Memory\nused_memory:100\n"),
            primary("b:2", "# Memory\nused_memory:lots\n"),
        ];
        assert_eq!(used_memory(&nodes), None);
    }

    #[test]
    fn test_huge_counters_do_not_overflow() {
        let max = i64::MAX;
        let big = format!(
            "# Stats\ninstantaneous_ops_per_sec:{max}\n\
             # Memory\nused_memory:{max}\n\
             # Keyspace\ndb0:keys={max},expires=0\n"
        );
        let nodes = vec![
            primary("a:1", &big),
            primary("b:2", &big),
            primary("c:3", &big),
        ];
        assert_eq!(sum_field(&nodes, "stats", "instantaneous_ops_per_sec"), i64::MAX);
        assert_eq!(used_memory(&nodes), None);
        assert_eq!(total_keys(&nodes), None);

        let one = primary(
            "a:1",
            &format!("# Keyspace\ndb0:keys={max}\ndb1:keys={max}\ndb2:keys=2\n"),
        );
        assert_eq!(node_keys(&one), None);

        let negative = vec![
            primary("a:1", "# Stats\ninstantaneous_ops_per_sec:-9223372036854775807\n"),
            primary("b:2", "# Stats\ninstantaneous_ops_per_sec:-9223372036854775807\n"),
        ];
        assert_eq!(
            sum_field(&negative, "stats", "instantaneous_ops_per_sec"),
            i64::MIN
        );
    }

    #[test]
    fn test_total_keys_single_db() {
        let nodes = vec![primary("a:1", "# Keyspace\ndb0:keys=5,expires=1\n")];
        assert_eq!(total_keys(&nodes), Some(5));
    }

    #[test]
    fn test_total_keys_sums_dbs_and_skips_replicas() {
        let nodes = vec![
            primary("a:1", "# Keyspace\ndb0:keys=5,expires=1\ndb3:keys=10,expires=0\n"),
            primary("b:2", "# Keyspace\ndb0:keys=1,expires=0\n"),
            replica("c:3", "# Keyspace\ndb0:keys=1000,expires=0\n"),
        ];
        assert_eq!(total_keys(&nodes), Some(16));
    }

    #[test]
    fn test_total_keys_malformed_is_none() {
        let nodes = vec![primary("a:1", "# Keyspace\ndb0:garbage\n")];
        assert_eq!(total_keys(&nodes), None);
        let nodes = vec![primary("a:1", "# Keyspace\ndb0:keys=many,expires=1\n")];
        assert_eq!(total_keys(&nodes), None);
    }

    #[test]
    fn test_total_keys_empty_keyspace() {
        let nodes = vec![primary("a:1", "# Keyspace\n")];
        assert_eq!(total_keys(&nodes), Some(0));
        assert_eq!(total_keys(&[]), Some(0));
    }

    #[test]
    fn test_version_from_first_node() {
        let nodes = vec![
            node("a:1", "# Server\nredis_version:7.2.4\n"),
            node("b:2", "# Server\nredis_version:6.0.0\n"),
        ];
        assert_eq!(version(&nodes).as_deref(), Some("7.2.4"));
        assert_eq!(version(&[node("a:1", "# Server\n")]), None);
        assert_eq!(version(&[]), None);
    }

    #[test]
    fn test_all_node_sums_and_median() {
        let nodes = vec![
            replica(
                "a:1",
                "# Stats\ninstantaneous_ops_per_sec:10\ninstantaneous_input_kbps:1.9\n\
                 # Clients\nconnected_clients:3\n",
            ),
            primary(
                "b:2",
                "# Stats\ninstantaneous_ops_per_sec:5\ninstantaneous_output_kbps:7\n\
                 # Clients\nconnected_clients:9\n",
            ),
        ];
        let record = OverviewRecord::from_nodes(&nodes, None);
        assert_eq!(record.ops_per_second, 15);
        assert_eq!(record.network_in_kbps, 1);
        assert_eq!(record.network_out_kbps, 7);
        assert_eq!(record.connected_clients, 6.0);
        assert_eq!(record.cpu_usage_percent, None);
    }

    #[test]
    fn test_unparsable_sum_field_counts_zero() {
        let nodes = vec![
            node("a:1", "# Stats\ninstantaneous_ops_per_sec:n/a\n"),
            node("b:2", "# Stats\ninstantaneous_ops_per_sec:4\n"),
        ];
        assert_eq!(sum_field(&nodes, "stats", "instantaneous_ops_per_sec"), 4);
    }

    // -----------------------------------------------------------------------
    // Aggregator
    // -----------------------------------------------------------------------

    #[test]
    fn test_overview_first_poll_has_no_cpu() {
        let aggregator = OverviewAggregator::default();
        let nodes = vec![MockNode::new("a:1", &info_text("7.2.4", 1.0, 1.0, 100, "master")).boxed()];
        let record = aggregator.get_overview("standalone", &nodes).unwrap();
        assert_eq!(record.version.as_deref(), Some("7.2.4"));
        assert_eq!(record.total_keys, Some(7));
        assert_eq!(record.used_memory_bytes, Some(1000));
        assert_eq!(record.connected_clients, 4.0);
        assert_eq!(record.ops_per_second, 10);
        assert_eq!(record.network_in_kbps, 1);
        assert_eq!(record.network_out_kbps, 2);
        assert_eq!(record.cpu_usage_percent, None);
        assert!(aggregator.tracker().has_baseline("standalone"));
    }

    #[test]
    fn test_overview_second_poll_sums_cluster_cpu() {
        let aggregator = OverviewAggregator::default();
        let first = vec![
            MockNode::new("a:1", &info_text("7.2.4", 0.0, 0.0, 100, "master")).boxed(),
            MockNode::new("b:2", &info_text("7.2.4", 0.0, 0.0, 100, "slave")).boxed(),
        ];
        assert_eq!(aggregator.get_overview("c", &first).unwrap().cpu_usage_percent, None);

        let second = vec![
            MockNode::new("a:1", &info_text("7.2.4", 3.0, 3.0, 110, "master")).boxed(),
            MockNode::new("b:2", &info_text("7.2.4", 3.0, 3.0, 110, "slave")).boxed(),
        ];
        let record = aggregator.get_overview("c", &second).unwrap();
        let cpu = record.cpu_usage_percent.unwrap();
        assert!((cpu - 120.0).abs() < 1e-9);
        assert_eq!(record.total_keys, Some(7));
        assert_eq!(record.used_memory_bytes, Some(1000));
        assert_eq!(record.ops_per_second, 20);
    }

    #[test]
    fn test_overview_fails_when_one_node_fails() {
        let aggregator = OverviewAggregator::default();
        let nodes = vec![
            MockNode::new("a:1", &info_text("7.2.4", 0.0, 0.0, 100, "master")).boxed(),
            MockNode::failing("b:2").boxed(),
            MockNode::new("c:3", &info_text("7.2.4", 0.0, 0.0, 100, "master")).boxed(),
        ];
        let err = aggregator.get_overview("c", &nodes).unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));
        assert!(!aggregator.tracker().has_baseline("c"));
    }

    #[test]
    fn test_failed_poll_keeps_previous_baseline() {
        let aggregator = OverviewAggregator::default();
        let ok = vec![MockNode::new("a:1", &info_text("7.2.4", 0.0, 0.0, 100, "master")).boxed()];
        aggregator.get_overview("t", &ok).unwrap();
        let broken = vec![MockNode::failing("a:1").boxed()];
        assert!(aggregator.get_overview("t", &broken).is_err());

        let next = vec![MockNode::new("a:1", &info_text("7.2.4", 1.0, 1.0, 120, "master")).boxed()];
        let cpu = aggregator.get_overview("t", &next).unwrap().cpu_usage_percent.unwrap();
        assert!((cpu - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_overview_node_without_cpu_section() {
        let aggregator = OverviewAggregator::default();
        let nodes = vec![MockNode::new("a:1", "# Server\r\nredis_version:2.8.0\r\n").boxed()];
        let first = aggregator.get_overview("old", &nodes).unwrap();
        assert_eq!(first.cpu_usage_percent, None);
        assert_eq!(first.total_keys, Some(0));
        let second = aggregator.get_overview("old", &nodes).unwrap();
        assert_eq!(second.cpu_usage_percent, Some(0.0));
    }

    #[test]
    fn test_record_serializes_nulls() {
        let record = OverviewRecord::from_nodes(&[], None);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["version"], serde_json::Value::Null);
        assert_eq!(json["total_keys"], 0);
        assert_eq!(json["cpu_usage_percent"], serde_json::Value::Null);
        assert_eq!(json["connected_clients"], 0.0);
    }
}
