use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use kvscope_core::{OverviewAggregator, OverviewRecord, Target, TargetConfig};

pub struct OverviewCommandConfig<'a> {
    pub nodes: &'a [String],
    pub target: &'a str,
    pub config_path: Option<&'a str>,
    pub interval_sec: f64,
    pub count: usize,
    pub json: bool,
    pub timeout_ms: u64,
}

pub fn run(cfg: OverviewCommandConfig<'_>) {
    let target = match build_target(&cfg) {
        Ok(t) => t,
        Err(e) => super::fail(e),
    };
    let interval = match poll_interval(cfg.interval_sec) {
        Ok(d) => d,
        Err(e) => super::fail(e),
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        log::warn!("cannot install Ctrl+C handler: {e}");
    }

    if !cfg.json {
        println!(
            "Polling {} ({} node{}) every {:.1}s",
            target.id,
            target.nodes.len(),
            if target.nodes.len() == 1 { "" } else { "s" },
            interval.as_secs_f64()
        );
    }

    let aggregator = OverviewAggregator::default();
    let mut polls = 0usize;
    let mut last_failed = false;

    while running.load(Ordering::SeqCst) {
        polls += 1;
        match aggregator.get_target_overview(&target) {
            Ok(record) => {
                last_failed = false;
                if cfg.json {
                    match serde_json::to_string(&record) {
                        Ok(line) => println!("{line}"),
                        Err(e) => super::fail(e),
                    }
                } else {
                    print_record(polls, &record);
                }
            }
            Err(e) => {
                last_failed = true;
                eprintln!("poll {polls}: {e}");
            }
        }

        if cfg.count > 0 && polls >= cfg.count {
            break;
        }
        sleep_while(&running, interval);
    }

    if last_failed {
        std::process::exit(1);
    }
}

/// `--node` wins; otherwise the `--target` entry of `--config`.
fn build_target(cfg: &OverviewCommandConfig<'_>) -> Result<Target, String> {
    if !cfg.nodes.is_empty() {
        return super::adhoc_target(cfg.target, cfg.nodes)
            .connect(super::timeout(cfg.timeout_ms))
            .map_err(|e| e.to_string());
    }
    let Some(path) = cfg.config_path else {
        return Err("pass --node host:port or --config PATH".to_string());
    };
    let config = kvscope_core::MonitorConfig::load(path).map_err(|e| format!("{path}: {e}"))?;
    let entry: &TargetConfig = config
        .targets
        .iter()
        .find(|t| t.id == cfg.target)
        .ok_or_else(|| format!("{path} has no target {:?}", cfg.target))?;
    entry
        .connect(config.node_timeout())
        .map_err(|e| e.to_string())
}

/// `--interval` seconds, floored at 100 ms. Infinite or out-of-range
/// values are rejected.
fn poll_interval(secs: f64) -> Result<Duration, String> {
    Duration::try_from_secs_f64(secs.max(0.1))
        .map_err(|e| format!("invalid --interval {secs}: {e}"))
}

/// Sleep in short steps so Ctrl+C is honoured promptly.
fn sleep_while(running: &AtomicBool, total: Duration) {
    // No representable deadline: wait until stopped.
    let deadline = Instant::now().checked_add(total);
    while running.load(Ordering::SeqCst) {
        let step = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                (deadline - now).min(Duration::from_millis(100))
            }
            None => Duration::from_millis(100),
        };
        std::thread::sleep(step);
    }
}

fn print_record(poll: usize, record: &OverviewRecord) {
    println!();
    println!("── poll {poll} ──");
    println!("  {:<18} {}", "version", opt(record.version.as_deref()));
    println!("  {:<18} {}", "keys", opt(record.total_keys));
    println!(
        "  {:<18} {}",
        "memory",
        record
            .used_memory_bytes
            .map_or_else(|| "-".to_string(), human_bytes)
    );
    println!("  {:<18} {}", "clients (median)", record.connected_clients);
    println!("  {:<18} {}", "ops/sec", record.ops_per_second);
    println!(
        "  {:<18} {} / {} kbps",
        "net in / out", record.network_in_kbps, record.network_out_kbps
    );
    println!(
        "  {:<18} {}",
        "cpu",
        record
            .cpu_usage_percent
            .map_or_else(|| "(next poll)".to_string(), |c| format!("{c:.1}%"))
    );
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.2}{}", UNITS[unit])
    }
}
