//! authbridge - OAuth sign-in and chunked session cookies
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - Sign-in redirect, OAuth callback, sign-out               │
//! │  - Home / protected / error pages                           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Session cookie layer                        │
//! │  - Chunked session cookies                                  │
//! │  - Per-request cookie accumulator                           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Identity backend                          │
//! │  - GoTrue auth API (PKCE code exchange, user lookup)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTML pages and metrics endpoint
//! - `auth`: Sign-in flow, session cookies, extractors
//! - `backend`: Identity backend trait and GoTrue client
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod metrics;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request; everything inside is read-only.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Identity backend every authentication call is delegated to
    pub backend: Arc<dyn backend::IdentityBackend>,
}

impl AppState {
    /// Initialize application state with the GoTrue backend
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let backend = backend::GoTrueClient::new(&config.backend, &config.auth)?;
        tracing::info!(backend = %config.backend.url, "Identity backend configured");

        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Initialize application state with an explicit backend
    pub fn with_backend(
        config: config::AppConfig,
        backend: Arc<dyn backend::IdentityBackend>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router(&state.config.auth))
        .merge(api::pages_router(&state.config.auth))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
