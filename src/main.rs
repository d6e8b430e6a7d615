use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use seqmint::api::{start_server, AppState, ServerConfig};
use seqmint::generator::{RetryConfig, SequenceNumberGenerator};
use seqmint::storage::{StoreBackend, StoreConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("seqmint=info".parse()?))
        .init();

    tracing::info!("seqmint starting...");

    let store_config = StoreConfig::from_env();
    let store = Arc::new(StoreBackend::open(&store_config)?);
    tracing::info!(backend = store.name(), "Counter store ready");

    let retry = RetryConfig::from_env();
    tracing::info!(
        max_attempts = retry.max_attempts,
        retry_delay_ms = retry.retry_delay_ms,
        "Counter retry budget"
    );

    let generator =
        SequenceNumberGenerator::new(Arc::clone(&store), Arc::clone(&store)).with_retry(retry);
    let state = Arc::new(AppState::new(generator, store.name()));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    start_server(ServerConfig::from_env(), state, shutdown).await?;

    tracing::info!("seqmint stopped");
    Ok(())
}
