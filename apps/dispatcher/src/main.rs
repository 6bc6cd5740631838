use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dispatcher::config::Config;
use dispatcher::dispatch::{Dispatcher, ReqwestTransport};
use dispatcher::routes::build_router;
use dispatcher::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting label dispatcher v{}", env!("CARGO_PKG_VERSION"));

    // Initialize HTTP transport
    let transport = ReqwestTransport::new(config.http_timeout)
        .context("Failed to build HTTP client")?;
    info!(
        "HTTP transport initialized (timeout: {}s)",
        config.http_timeout.as_secs()
    );

    match &config.gateway_url {
        Some(url) => info!("Default gateway: {url}"),
        None => info!("No default gateway configured; requests must supply gateway_url"),
    }
    if let Some(dir) = &config.render_output_dir {
        info!("Rendered documents will be saved to {}", dir.display());
    }

    let dispatcher = Dispatcher::new(Arc::new(transport), config.dispatch_settings());
    info!(
        "Default pacing: pools of {} with {}s between pools",
        config.default_pacing.pool_size, config.default_pacing.delay_secs
    );

    // Build app state
    let state = AppState {
        dispatcher,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
