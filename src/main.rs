use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use coin_price_hub::{routes, AppState, HubConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = HubConfig::from_env();
    let addr: SocketAddr = format!("{}:{}", cfg.bind, cfg.port).parse()?;

    tracing::info!(
        upstream = %cfg.api_url,
        ttl_secs = cfg.cache_ttl.as_secs(),
        interval_secs = cfg.broadcast_interval.as_secs(),
        coins = cfg.coin_limit,
        "Starting price hub"
    );

    let state = AppState::new(cfg)?;
    state.broadcaster().spawn();

    let app = routes::app(state);

    tracing::info!("Price hub listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping");
}
