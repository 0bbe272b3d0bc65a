//! Chathub Server
//!
//! Run with: cargo run -- serve
//!
//! # Configuration
//!
//! Settings come from a TOML file (see `chathub config`) with environment
//! overrides:
//! - `CHATHUB_API_HOST` / `CHATHUB_API_PORT`: bind address (default: 0.0.0.0:8080)
//! - `CHATHUB_JWT_SECRET`: token verification secret (falls back to `JWT_SECRET`)
//! - `CHATHUB_ROUTING`: broadcast, direct, or room
//! - `CHATHUB_LOG_LEVEL` / `CHATHUB_LOG_FORMAT`: logging
//! - `RUST_LOG`: full filter directive, takes precedence over the log level

use anyhow::Context;
use chathub::api::{serve, AppState};
use chathub::config::{generate_default_config, Config, ConfigSource, LoggingConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "chathub")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Live-connection hub for real-time chat")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the hub server
    Serve {
        /// Override bind host
        #[arg(long)]
        host: Option<String>,
        /// Override bind port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote default config to {}", path.display());
                }
                None => print!("{}", content),
            }
            Ok(())
        }
        Commands::Serve { host, port } => {
            let (mut config, source, failures) = match &cli.config {
                Some(path) => (
                    Config::load_with_env(path)?,
                    ConfigSource::File(path.clone()),
                    Vec::new(),
                ),
                None => Config::discover(),
            };
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }

            init_tracing(&config.logging);
            source.log(&failures);
            config.validate()?;

            tracing::info!("Starting Chathub v{}", env!("CARGO_PKG_VERSION"));
            tracing::info!(
                routing = ?config.hub.routing,
                max_connections = config.hub.max_connections,
                queue_capacity = config.hub.queue_capacity,
                "Hub configured"
            );

            let state = AppState::from_config(&config);
            serve(state, &config.api).await?;

            tracing::info!("Chathub stopped");
            Ok(())
        }
    }
}

/// Install the global tracing subscriber
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("chathub={},tower_http=debug", logging.level))
    });

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
