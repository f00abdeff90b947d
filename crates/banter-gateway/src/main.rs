use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use banter_gateway::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banter_gateway=info,tower_http=debug".into()),
        )
        .init();

    // Load config: explicit BANTER_CONFIG env > ~/.banter/banter.toml.
    let config = banter_core::config::BanterConfig::load(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        banter_core::config::BanterConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    // Backend and provider selection happens here, once. Failures are
    // fatal — there is no request-time fallback.
    let state = Arc::new(app::AppState::init(config)?);
    let router = app::build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Banter gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<app::AppState>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, cancelling active turns");
    state.shutdown();
}
