use kvscope_core::MonitorConfig;

pub fn run(path: &str) {
    let config = match MonitorConfig::load(path) {
        Ok(c) => c,
        Err(e) => super::fail(format!("{path}: {e}")),
    };

    println!("{path}: OK");
    println!(
        "  server            {}:{}",
        config.server.host, config.server.port
    );
    println!("  node timeout      {} ms", config.node_timeout_ms);
    match config.baseline_ttl() {
        Some(ttl) => println!("  baseline ttl      {} s", ttl.as_secs()),
        None => println!("  baseline ttl      disabled"),
    }
    println!("  output format     {}", config.output_format);
    println!("  targets           {}", config.targets.len());
    for target in &config.targets {
        println!("    {:<16} {}", target.id, target.nodes.join(", "));
    }
}
