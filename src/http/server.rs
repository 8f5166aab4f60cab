//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the module and ingest handlers
//! - Wire up middleware (request ID, tracing, body limit)
//! - Bind server to listener and drain on shutdown

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing::post, Router};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::http::ingest::ingest_telemetry;
use crate::lifecycle::{AnalyticsHost, Shutdown};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub host: Arc<AnalyticsHost>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(host: Arc<AnalyticsHost>) -> Self {
        let api_key = host.config().admin.api_key.as_deref().map(Arc::from);
        Self { host, api_key }
    }
}

/// HTTP front of the analytics host.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(host: Arc<AnalyticsHost>) -> Self {
        let max_body_bytes = host.config().listener.max_body_bytes;
        let router = Self::build_router(AppState::new(host), max_body_bytes);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
        let ingest = Router::new()
            .route("/api/telemetry", post(ingest_telemetry))
            .with_state(state.clone());

        Router::new()
            .merge(setup_admin_router(state))
            .merge(ingest)
            .layer(DefaultBodyLimit::max(max_body_bytes))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut rx = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                if !shutdown.is_triggered() {
                    let _ = rx.recv().await;
                }
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
