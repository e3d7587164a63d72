//! # Tool Gateway Main Entry Point
//!
//! This is the main entry point for the gateway service.

use gateway::{config::ConfigLoader, server::run_server, telemetry::init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!("Configuration: {}", redacted_json);
    }

    // Start the server with the loaded configuration
    run_server(config).await
}
