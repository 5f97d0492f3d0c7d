//! HTTP server wrapper: builds the router, layers on the middleware
//! stack, and binds. Grounded on `mcp-gateway/src/server.rs`'s
//! `ServiceBuilder` layering.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use predictor_common::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// HTTP server wrapper for the admin API.
pub struct Server {
    state: AppState,
    shutdown: Arc<Notify>,
}

impl Server {
    pub fn new(state: AppState, shutdown: Arc<Notify>) -> Self {
        Server { state, shutdown }
    }

    /// Binds and serves until `shutdown` is notified, then drains
    /// in-flight requests before returning.
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let app = self.create_app();

        info!(bind_addr, "starting admin HTTP server");
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|e| Error::Configuration(format!("failed to bind to {bind_addr}: {e}")))?;

        let shutdown = Arc::clone(&self.shutdown);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.notified().await })
            .await
            .map_err(|e| Error::Generic(anyhow::anyhow!("admin server error: {e}")))?;

        Ok(())
    }

    fn create_app(&self) -> Router {
        handlers::create_router(self.state.clone()).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any)
                        .max_age(Duration::from_secs(3600)),
                )
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
    }
}
