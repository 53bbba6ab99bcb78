//! Sealpost HTTP service.
//!
//! A single network-triggered operation: `POST /encrypt` accepts arbitrary
//! binary content and returns it encrypted and signed as an OpenPGP
//! message, using key material resolved from configuration. The
//! cryptographic core lives in [`sealpost_pgp`]; this crate is the I/O
//! boundary: axum routing, the function-key gate, the secrets provider,
//! and the request orchestrator.
//!
//! # Components
//!
//! - [`config::SecretsProvider`]: configuration seam (env-backed in
//!   production, map-backed in tests)
//! - [`flow::RequestFlow`]: per-request state machine
//!   (validate → process → complete/fail, no retries, all-or-nothing)
//! - [`build_router`]: HTTP surface (`POST /encrypt`, `GET /health`)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod auth;
pub mod config;
mod error;
pub mod flow;
mod handlers;

use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware::Next,
    response::Response,
    routing::{get, post},
};
pub use error::ApiError;
use sealpost_pgp::EncryptOptions;
use tokio::net::TcpListener;

use crate::config::SecretsProvider;

/// Shared state for all requests.
pub struct AppState {
    /// Configuration source, resolved per request
    pub secrets: Arc<dyn SecretsProvider>,
    /// Output shaping for the cryptographic core
    pub options: EncryptOptions,
    /// Maximum accepted request body, in bytes
    pub body_limit: usize,
}

impl AppState {
    /// Default body limit: 32 MiB.
    pub const DEFAULT_BODY_LIMIT: usize = 32 * 1024 * 1024;

    /// State over a secrets provider with default options.
    pub fn new(secrets: Arc<dyn SecretsProvider>) -> Self {
        Self { secrets, options: EncryptOptions::default(), body_limit: Self::DEFAULT_BODY_LIMIT }
    }
}

/// Build the HTTP surface.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/encrypt", post(handlers::handle_encrypt))
        .route("/health", get(handlers::handle_health))
        .layer(DefaultBodyLimit::max(state.body_limit))
        .layer(axum::middleware::from_fn(logging_middleware))
        .with_state(state)
}

/// Bind and serve until shutdown or a fatal I/O error.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> std::io::Result<()> {
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await
}

/// Request/response logging.
///
/// Health probes log at trace; client errors at warn; server errors at
/// error. Bodies and key-bearing headers are never logged.
#[allow(clippy::disallowed_methods)] // wall-clock latency measurement
async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis();

    if path == "/health" {
        tracing::trace!(%method, %path, %status, duration_ms, "health check");
    } else if status.is_server_error() {
        tracing::error!(%method, %path, %status, duration_ms, "request failed");
    } else if status.is_client_error() {
        tracing::warn!(%method, %path, %status, duration_ms, "request rejected");
    } else {
        tracing::info!(%method, %path, %status, duration_ms, "request");
    }

    response
}
