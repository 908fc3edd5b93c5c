//! Poll one node a few times and print its overview.
//!
//! Run with: cargo run -p kvscope-core --example poll_overview -- 127.0.0.1:6379

use std::time::Duration;

use kvscope_core::{NodeConnection, OverviewAggregator, TcpNode, Target};

fn main() {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:6379".to_string());
    let address = match addr.parse() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let node: Box<dyn NodeConnection> = Box::new(TcpNode::new(address, Duration::from_secs(2)));
    let target = Target::new("example", vec![node]);
    let aggregator = OverviewAggregator::default();

    for _ in 0..3 {
        match aggregator.get_target_overview(&target) {
            Ok(record) => println!(
                "version={:?} keys={:?} clients={} ops/s={} cpu={:?}",
                record.version,
                record.total_keys,
                record.connected_clients,
                record.ops_per_second,
                record.cpu_usage_percent
            ),
            Err(e) => eprintln!("poll failed: {e}"),
        }
        std::thread::sleep(Duration::from_secs(1));
    }
}
