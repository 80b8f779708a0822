//! S3 Gateway
//!
//! Reads one JSON tool call per line on stdin and writes one JSON reply per
//! line on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use s3_gateway::config::{self, Config};
use s3_gateway::dispatch;
use s3_gateway::s3::S3Connector;
use s3_gateway::{ConnectionManager, Gateway};
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = config::load_dotenv();

    // Initialize logging
    let default_level = if config::debug_enabled() { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    tracing::info!("Starting S3 gateway v{}", env!("CARGO_PKG_VERSION"));
    match dotenv {
        Ok(Some(path)) => tracing::debug!("Loaded environment from {:?}", path),
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to load .env file: {}", e),
    }

    let config = Config::from_env().context("Environment validation failed")?;
    tracing::info!("AWS Region: {}", config.region_display());
    tracing::info!("Debug mode: {}", if config.debug { "Enabled" } else { "Disabled" });
    if let Some(endpoint) = &config.endpoint_url {
        tracing::info!("S3 endpoint: {}", endpoint);
    }

    let connector = S3Connector::new(config.client_config());
    let gateway = Gateway::new(ConnectionManager::new(connector));

    dispatch::serve(&gateway, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
        .context("Failed to serve requests")?;

    tracing::info!("Gateway stopped");
    Ok(())
}
