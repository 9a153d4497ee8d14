// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP server built on axum.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use wapipe_core::{ProviderRegistry, WapipeError};
use wapipe_queue::MessageQueue;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;
use crate::processor::WebhookProcessor;

/// State for the unauthenticated health and metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: std::time::Instant,
    /// Renders the Prometheus exposition, when an exporter is installed.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            prometheus_render: None,
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<MessageQueue>,
    pub registry: Arc<ProviderRegistry>,
    pub processor: Arc<WebhookProcessor>,
    pub auth: AuthConfig,
    pub health: HealthState,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Builds the route table:
///
/// - `GET /health`, `GET /metrics`: public
/// - `GET|POST /webhooks/{tenant}`: authenticated by provider signature
/// - `/v1/...`: bearer token
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .route(
            "/webhooks/{tenant}",
            get(handlers::verify_webhook).post(handlers::receive_webhook),
        )
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/tenants/{tenant}/messages", post(handlers::enqueue_message))
        .route(
            "/v1/messages/{id}",
            get(handlers::get_message).delete(handlers::cancel_message),
        )
        .route("/v1/stats", get(handlers::get_stats))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
}

/// Serves until `cancel` fires, then drains in-flight requests.
pub async fn start_server(
    config: &ServerConfig,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), WapipeError> {
    let app = router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WapipeError::Config(format!("failed to bind {addr}: {e}")))?;

    tracing::info!("HTTP server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| WapipeError::Internal(format!("HTTP server error: {e}")))?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
