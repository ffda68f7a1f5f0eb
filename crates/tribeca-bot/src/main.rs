//! Tribeca market-making bot - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Market-making bot for a single trading pair
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TRIBECA_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tribeca_telemetry::init_logging()?;

    info!("Starting Tribeca v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > TRIBECA_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("TRIBECA_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = tribeca_bot::AppConfig::from_file(&config_path)?;
    info!(exchange = %config.exchange, pair = %config.pair, "Configuration loaded");

    let app = tribeca_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
