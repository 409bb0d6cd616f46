//! meshsyncd — the meshsync daemon.
//!
//! Single binary that assembles every meshsync subsystem:
//! - Route, mapping and association directories
//! - Backend set reconciler fed by the scheduler
//! - Snapshot publisher (collector + translator)
//! - REST ingestion API
//!
//! # Usage
//!
//! ```text
//! meshsyncd run --config /etc/meshsync/meshsyncd.toml
//! meshsyncd --log-format json run --listen 127.0.0.1:9000
//! meshsyncd check-config --config /etc/meshsync/meshsyncd.toml
//! ```

mod config;
mod daemon;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const DEFAULT_LOG_FILTER: &str = "info,meshsyncd=debug,meshsync=debug";

#[derive(Parser)]
#[command(name = "meshsyncd", about = "meshsync daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon.
    Run {
        /// Path to meshsyncd.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override `[api] listen`.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Parse and validate a config file, then exit.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run { config, listen } => {
            let mut config = match config {
                Some(path) => {
                    let loaded = Config::from_file(&path)?;
                    tracing::info!(path = %path.display(), "config loaded");
                    loaded
                }
                None => Config::default(),
            };
            if let Some(listen) = listen {
                config.api.listen = listen;
            }
            daemon::run(config).await
        }
        Command::CheckConfig { config } => {
            let loaded = Config::from_file(&config)?;
            println!(
                "{}: ok (listen {}, scheduler {}, {} cert pairs, {} policies)",
                config.display(),
                loaded.api.listen,
                loaded.scheduler.url.as_deref().unwrap_or("none"),
                loaded.certs.pair.len(),
                loaded.policy.len(),
            );
            Ok(())
        }
    }
}
