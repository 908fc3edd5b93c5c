use kvscope_server::AppState;

pub fn run(
    config_path: Option<&str>,
    nodes: &[String],
    host: Option<String>,
    port: Option<u16>,
    timeout_ms: u64,
) {
    let mut config = super::load_config(config_path);
    if config_path.is_none() {
        config.node_timeout_ms = timeout_ms;
    }
    if !nodes.is_empty() {
        config.targets.push(super::adhoc_target("default", nodes));
    }
    if let Some(h) = host {
        config.server.host = h;
    }
    if let Some(p) = port {
        config.server.port = p;
    }
    if let Err(e) = config.validate() {
        super::fail(e);
    }
    if config.targets.is_empty() {
        super::fail("no targets: pass --config PATH or --node host:port");
    }

    let state = match AppState::from_config(&config) {
        Ok(s) => s,
        Err(e) => super::fail(e),
    };

    let base = format!("http://{}:{}", config.server.host, config.server.port);
    let first = &config.targets[0].id;

    println!("kvscope server v{}", kvscope_core::VERSION);
    println!("   {base}");
    println!("   {} target(s)", config.targets.len());
    for target in &config.targets {
        println!("     {:<16} {}", target.id, target.nodes.join(", "));
    }
    println!();
    println!("   Endpoints:");
    println!("     GET    /                        API index");
    println!("     GET    /health                  Health check");
    println!("     GET    /targets                 Configured targets");
    println!("     GET    /targets/{{id}}/overview   Aggregated overview");
    println!("     POST   /targets/{{id}}/command    Run one command");
    println!("     DELETE /targets/{{id}}/baseline   Reset CPU baseline");
    println!();
    println!("   Examples:");
    println!("     curl {base}/targets/{first}/overview");
    println!(
        "     curl -X POST {base}/targets/{first}/command -H 'content-type: application/json' -d '{{\"command\":\"INFO server\",\"format\":\"text\"}}'"
    );
    println!();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => super::fail(e),
    };
    if let Err(e) = rt.block_on(kvscope_server::run_server(
        state,
        &config.server.host,
        config.server.port,
    )) {
        super::fail(e);
    }
}
