//! Stowage API Server
//!
//! Main entry point for the object storage gateway.

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stowage_api::{AppState, create_router};
use stowage_core::storage::build_gateway;
use stowage_core::transfer::TransferService;
use stowage_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stowage=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // One gateway for the whole process
    let gateway = build_gateway(&config.storage).await?;
    info!(
        backend = config.storage.backend.as_str(),
        endpoint = %config.storage.endpoint,
        use_tls = config.storage.use_tls,
        "Storage backend configured"
    );

    let transfer = TransferService::new(gateway, &config.storage);
    let app = create_router(AppState::new(transfer, &config.storage));

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
