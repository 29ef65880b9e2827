//! authbridge binary entry point

use authbridge::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging
/// 3. Initialize AppState
/// 4. Build Axum router
/// 5. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    init_tracing(&config.logging);

    tracing::info!("Starting authbridge...");
    tracing::info!(
        base_url = %config.server.base_url,
        provider = %config.backend.provider,
        cookie = %config.auth.cookie_name,
        "Configuration loaded"
    );
    if config.uses_insecure_public_origin() {
        tracing::warn!(
            base_url = %config.server.base_url,
            "Public origin is plain http on a non-local host; session cookies travel unencrypted"
        );
    }

    authbridge::metrics::init_metrics();

    // 3. Initialize application state
    let state = AppState::new(config.clone())?;

    // 4. Build Axum router
    let app = authbridge::build_router(state);

    // 5. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Public URL: {}", config.server.base_url);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(logging: &config::LoggingConfig) {
    let default_filter = format!("authbridge={},tower_http=debug", logging.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
