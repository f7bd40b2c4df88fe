//! Axum server setup
//!
//! - Localhost-only CORS by default
//! - Tracing middleware
//! - Graceful shutdown on SIGTERM/Ctrl+C, then pools are closed

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes;
use crate::error::Result;
use crate::layouts::LayoutStore;
use crate::registry::Registry;
use crate::settings::Settings;

/// Dev-server origins allowed when CORS is not permissive
const LOCAL_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://127.0.0.1:3000",
    "http://localhost:8000",
    "http://127.0.0.1:8000",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8000)
    pub bind_addr: SocketAddr,

    /// Allow any origin (default: false = localhost dev origins only)
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            cors_permissive: false,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub registry: Registry,
    pub layouts: LayoutStore,
}

impl AppState {
    pub fn new(registry: Registry, layouts: LayoutStore) -> Self {
        Self { registry, layouts }
    }

    /// Build backend pools and open the layout store.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let registry = Registry::connect_lazy(settings);
        let layouts = LayoutStore::open(&settings.sqlite_path).await?;
        Ok(Self::new(registry, layouts))
    }

    pub async fn close(&self) {
        self.registry.close().await;
        self.layouts.close().await;
    }
}

/// All routes; API under `/api`, health at the root.
pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let cors = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = LOCAL_ORIGINS
            .into_iter()
            .map(HeaderValue::from_static)
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let api = Router::new()
        .merge(routes::tables::router())
        .merge(routes::layouts::router());

    Router::new()
        .merge(routes::health::router())
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until a shutdown signal arrives, then release every pool.
pub async fn run_server(state: AppState, config: ServerConfig) -> Result<()> {
    let state = Arc::new(state);
    let app = build_router(state.clone(), &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.close().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8000);
        assert!(!config.cors_permissive);
    }
}
