mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::contracts::{CounterStore, IdentifierIndex};

pub use handlers::{
    AppState, ErrorResponse, GenerateRequest, GenerateResponse, ListCountersResponse, Metrics,
    RecordIdentifierRequest,
};

/// Creates the API router.
pub fn create_router<C: CounterStore + 'static, I: IdentifierIndex + 'static>(
    state: Arc<AppState<C, I>>,
) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::health_live))
        .route("/health/ready", get(handlers::health_ready::<C, I>))
        .route("/stats", get(handlers::get_stats::<C, I>))
        .route("/metrics", get(handlers::metrics::<C, I>))
        .route(
            "/sequences/generate",
            post(handlers::generate_number::<C, I>),
        )
        .route("/sequences", get(handlers::list_counters::<C, I>))
        .route(
            "/sequences/:sequence_type/:period_type",
            get(handlers::get_current_counter::<C, I>),
        )
        .route(
            "/collections/:collection/identifiers",
            post(handlers::record_identifier::<C, I>),
        )
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Reads `SEQMINT_HOST` and `SEQMINT_PORT`, falling back to defaults.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("SEQMINT_HOST").unwrap_or(default.host),
            port: std::env::var("SEQMINT_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(default.port),
        }
    }
}

/// Starts the HTTP server.
pub async fn start_server<C, I, F>(
    config: ServerConfig,
    state: Arc<AppState<C, I>>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    C: CounterStore + 'static,
    I: IdentifierIndex + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
