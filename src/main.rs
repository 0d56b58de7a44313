use anyhow::{Context, Result};
use sni_proxy::{app, config, logging};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    // Load config first (before logging init) to get logging config
    let config = config::AppConfig::load_or_default(&config_path);

    // Configuration errors are fatal before anything is bound
    config
        .validate()
        .context("Configuration validation failed")?;

    let _guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging system")?;

    info!("SNI Proxy starting with config {}", config_path);
    info!(
        "Logging initialized - level: {}, file: {:?}, json: {}",
        config.logging.level, config.logging.file, config.logging.json
    );
    info!(
        "Routing {} hostnames ({} TLS-only), default route: {}",
        config.routes.hosts.len(),
        config.routes.tls_hosts.len(),
        config.routes.default.is_some()
    );

    let mut app = app::App::new(config);
    app.start().context("Failed to start SNI Proxy")?;

    info!("SNI Proxy started successfully. Press Ctrl+C to shutdown.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received, shutting down gracefully...");
    app.wait_for_shutdown().await;

    Ok(())
}
