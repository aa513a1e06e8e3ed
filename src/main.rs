// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! combograph CLI - relationship graph service for Commander combos

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use combograph::{commands, config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "combograph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(short, long, env = "COMBOGRAPH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Dataset path override
    #[arg(short, long, global = true)]
    dataset: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR", global = true)]
    no_color: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the dataset and serve queries
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(short, long)]
        port: Option<u16>,

        /// Serve a single session on stdin/stdout instead of TCP
        #[arg(long)]
        stdio: bool,
    },

    /// Answer one method in-process, without a server
    Query {
        /// Method name (e.g. getDistance1Combos)
        method: String,

        /// Params as a JSON object
        params: Option<String>,
    },

    /// Send one request to a running service
    Call {
        /// Method name (e.g. getDistance1Combos)
        method: String,

        /// Params as a JSON object
        params: Option<String>,

        /// Service address (defaults to server.host:server.port)
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Check a running service
    Health {
        /// Service address (defaults to server.host:server.port)
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Print graph statistics for the dataset
    Stats,

    /// Export the combo graph
    Export {
        /// Output format (dot, json)
        #[arg(short, long, default_value = "dot")]
        format: String,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only these combos (DOT only), comma separated
        #[arg(long, value_delimiter = ',')]
        combos: Vec<String>,
    },

    /// Print the effective configuration
    Config {
        /// Dotted key (e.g. server.port); omit for everything
        key: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: clap_complete::Shell,
    },
}

fn init_logging(cli: &Cli, configured: Option<&str>) {
    let level = match cli.verbose {
        0 if cli.quiet => "error",
        0 => configured.unwrap_or("info"),
        1 => "debug",
        _ => "trace",
    };

    // RUST_LOG wins over flags and config
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(cli));
    // A stdio session leaves a blocking stdin read on the pool; never wait for it
    runtime.shutdown_background();
    result
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = config::load(cli.config.as_deref())?;
    init_logging(&cli, settings.log_level.as_deref());

    if let Some(dataset) = cli.dataset.clone() {
        settings.dataset.path = dataset;
    }
    let color = !cli.no_color;

    match cli.command {
        Commands::Serve { host, port, stdio } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            commands::serve::run(settings, stdio).await
        }
        Commands::Query { method, params } => {
            commands::query::run(&settings, &method, params.as_deref())
        }
        Commands::Call { method, params, address } => {
            commands::call::run(&settings, address, &method, params.as_deref()).await
        }
        Commands::Health { address } => {
            commands::call::health(&settings, address).await
        }
        Commands::Stats => {
            commands::stats::run(&settings, cli.json, color)
        }
        Commands::Export { format, output, combos } => {
            commands::export::run(&settings, &format, output, &combos)
        }
        Commands::Config { key } => {
            commands::config::run(&settings, key.as_deref())
        }
        Commands::Completions { shell } => {
            commands::completions::run(shell, &mut Cli::command())
        }
    }
}
