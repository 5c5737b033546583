//! Power-ups proxy
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http server ──▶ pipeline ──────────────────────────▶ upstream
//!                  │              ip_blocklist → bot_detection →       (collector)
//!                  │              user_id                                  │
//!                  │                                                       │
//!     Client ◀─────┴──────────── cookie_keeper ◀───────────────────────────┘
//! ```
//!
//! Configuration comes from an optional TOML file and the `POWERUPS_CONFIG`,
//! `UPSTREAM_URL` and `PORT` environment variables.

use std::path::PathBuf;

use clap::Parser;

use powerups_proxy::config;
use powerups_proxy::lifecycle;
use powerups_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "powerups-proxy")]
#[command(about = "Reverse proxy adding power-ups in front of a tagging server", long_about = None)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long, env = "POWERUPS_PROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        "powerups-proxy starting"
    );

    lifecycle::start(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
