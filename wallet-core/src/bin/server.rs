//! Wallet engine server binary

use wallet_core::{Config, Engine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting PesaCore wallet server");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(config = %serde_json::to_string(&config)?, "Loaded configuration");

    // Open engine
    let _engine = Engine::open(config)?;
    tracing::info!("Engine opened successfully");

    // Routing is owned by the gateway layer; keep the engine alive until
    // shutdown is requested.
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down wallet server");
    Ok(())
}
