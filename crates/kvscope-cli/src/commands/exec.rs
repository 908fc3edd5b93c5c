use kvscope_core::{NodeConnection, OutputFormat};

pub fn run(node: &str, format: OutputFormat, args: &[String], timeout_ms: u64) {
    let conn = super::connect_node(node, timeout_ms);
    let argv: Vec<&str> = args.iter().map(String::as_str).collect();

    let reply = match conn.command(&argv) {
        Ok(r) => r,
        Err(e) => super::fail(e),
    };

    match format.formatter().format(&reply) {
        serde_json::Value::String(text) if format == OutputFormat::Text => println!("{text}"),
        value => match serde_json::to_string_pretty(&value) {
            Ok(s) => println!("{s}"),
            Err(e) => super::fail(e),
        },
    }
}
