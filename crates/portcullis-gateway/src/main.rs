//! Portcullis gateway CLI
//!
//! Starts the HTTP gateway.

use anyhow::Context;
use clap::Parser;
use portcullis_gateway::{start_server, GatewayConfig};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// CRM authentication gateway and signed AI proxy
#[derive(Debug, Parser)]
#[command(name = "portcullis", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "PORTCULLIS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            warn!("No config file specified, using default test configuration");
            GatewayConfig::default_test_config()
        }
    };
    config
        .apply_env(|key| std::env::var(key).ok())
        .context("applying environment overrides")?;

    start_server(config).await?;
    Ok(())
}
