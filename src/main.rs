use anyhow::Context;
use std::net::SocketAddr;
use tracing::{info, warn};

use rentpay_relay::build_router;
use rentpay_relay::config::AppConfig;
use rentpay_relay::database::connection::open_payment_store;
use rentpay_relay::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    info!("Short code: {}", config.mpesa_short_code);
    info!("Environment: {}", config.mpesa_environment);

    let store = open_payment_store(&config)
        .await
        .context("failed to open payment store")?;
    let app_state = AppState::new(config, store).context("failed to build application state")?;

    // Credentials are re-checked on every payment; this only surfaces bad ones early.
    match app_state.mpesa_service.get_access_token().await {
        Ok(_) => info!("M-Pesa credentials verified"),
        Err(e) => warn!("M-Pesa credentials could not be verified at startup: {}", e),
    }

    let addr: SocketAddr = format!("{}:{}", app_state.config.host, app_state.config.port)
        .parse()
        .context("HOST/PORT do not form a valid socket address")?;

    let app = build_router(app_state);
    start_server(app, addr).await
}

async fn start_server(app: axum::Router, addr: SocketAddr) -> anyhow::Result<()> {
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
