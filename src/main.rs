//! # Notify Hub
//!
//! Real-time chat and notification hub.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Presence and offline storage backends
//! - HTTP/WebSocket server

use anyhow::Result;
use tracing::info;

use notify_hub::config::Settings;
use notify_hub::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    notify_hub::telemetry::init_tracing();

    info!("Starting Notify Hub...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        server_id = %settings.hub.server_id,
        environment = %settings.environment,
        "Configuration loaded"
    );

    // Build and run the application
    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
