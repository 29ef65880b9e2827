//! Prometheus scrape endpoint for the sign-in and session counters.

use axum::{
    Router,
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::error::AppError;
use crate::metrics::REGISTRY;

/// GET /metrics
///
/// Encoding failures surface as a 500 through [`AppError`].
async fn scrape() -> Result<impl IntoResponse, AppError> {
    let encoder = TextEncoder::new();
    let body = encoder
        .encode_to_string(&REGISTRY.gather())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("encoding metrics: {e}")))?;

    Ok(([(CONTENT_TYPE, encoder.format_type().to_string())], body))
}

/// Router serving `/metrics`; it needs no application state.
pub fn metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(scrape))
}
