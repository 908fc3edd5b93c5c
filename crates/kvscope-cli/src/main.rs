//! CLI for kvscope: one health snapshot for every node of a key-value deployment.

mod commands;

use clap::{Parser, Subcommand};

use kvscope_core::OutputFormat;

#[derive(Parser)]
#[command(name = "kvscope")]
#[command(about = "kvscope: overview, INFO and command passthrough for key-value nodes")]
#[command(version = kvscope_core::VERSION)]
struct Cli {
    /// Per-node connect/read/write timeout in milliseconds
    #[arg(
        long,
        global = true,
        default_value = "3000",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every node of a target and print the aggregated overview.
    /// CPU usage appears from the second poll on. Ctrl+C stops.
    Overview {
        /// Node address (host:port); repeat or comma-separate for a cluster
        #[arg(long = "node", value_delimiter = ',')]
        nodes: Vec<String>,

        /// Target id; with --config and no --node, selects a configured target
        #[arg(long, default_value = "default")]
        target: String,

        /// TOML config to read targets from
        #[arg(long)]
        config: Option<String>,

        /// Seconds between polls
        #[arg(long, default_value = "2.0")]
        interval: f64,

        /// Number of polls (0 = until Ctrl+C)
        #[arg(long, default_value = "0")]
        count: usize,

        /// Print one JSON record per poll
        #[arg(long)]
        json: bool,
    },

    /// Fetch INFO from one node and print the parsed sections
    Info {
        /// Node address (host:port)
        #[arg(long)]
        node: String,

        /// Only print this section (case-insensitive)
        #[arg(long)]
        section: Option<String>,

        /// Print sections as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one command on a node and print the formatted reply
    Exec {
        /// Node address (host:port)
        #[arg(long)]
        node: String,

        /// Reply format: raw (JSON, default) or text (redis-cli style)
        #[arg(long, default_value = "raw")]
        format: OutputFormat,

        /// Command and arguments, e.g. `GET foo`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Start the HTTP API
    Server {
        /// TOML config with targets and listener settings
        #[arg(long)]
        config: Option<String>,

        /// Ad-hoc target nodes (host:port), served as target "default"
        #[arg(long = "node", value_delimiter = ',')]
        nodes: Vec<String>,

        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Validate a config file and list its targets
    CheckConfig {
        /// Path to the TOML config
        path: String,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let timeout_ms = cli.timeout_ms;

    match cli.command {
        Commands::Overview {
            nodes,
            target,
            config,
            interval,
            count,
            json,
        } => commands::overview::run(commands::overview::OverviewCommandConfig {
            nodes: &nodes,
            target: &target,
            config_path: config.as_deref(),
            interval_sec: interval,
            count,
            json,
            timeout_ms,
        }),
        Commands::Info {
            node,
            section,
            json,
        } => commands::info::run(&node, section.as_deref(), json, timeout_ms),
        Commands::Exec { node, format, args } => {
            commands::exec::run(&node, format, &args, timeout_ms)
        }
        Commands::Server {
            config,
            nodes,
            host,
            port,
        } => commands::server::run(config.as_deref(), &nodes, host, port, timeout_ms),
        Commands::CheckConfig { path } => commands::check_config::run(&path),
    }
}
