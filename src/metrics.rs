//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Auth flow metrics
    pub static ref SIGNIN_REDIRECTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authbridge_signin_redirects_total", "Total number of sign-in attempts"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref AUTH_CALLBACKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authbridge_auth_callbacks_total", "Total number of OAuth callbacks handled"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref SESSION_COOKIE_CHUNKS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "authbridge_session_cookie_chunks",
            "Number of cookies a serialized session was split into"
        ).buckets(vec![1.0, 2.0, 3.0, 4.0, 6.0, 8.0])
    ).expect("metric can be created");
    pub static ref SESSION_LOOKUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authbridge_session_lookups_total", "Total number of session lookups"),
        &["result"]
    ).expect("metric can be created");
    pub static ref SIGNOUTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authbridge_signouts_total", "Total number of sign-outs"),
        &["backend"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authbridge_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(SIGNIN_REDIRECTS_TOTAL.clone()))
            .expect("SIGNIN_REDIRECTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(AUTH_CALLBACKS_TOTAL.clone()))
            .expect("AUTH_CALLBACKS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SESSION_COOKIE_CHUNKS.clone()))
            .expect("SESSION_COOKIE_CHUNKS can be registered");
        REGISTRY
            .register(Box::new(SESSION_LOOKUPS_TOTAL.clone()))
            .expect("SESSION_LOOKUPS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SIGNOUTS_TOTAL.clone()))
            .expect("SIGNOUTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}
