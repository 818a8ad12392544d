use anyhow::Context;
use tracing_subscriber::EnvFilter;

use range_relay::config::ProxyConfig;
use range_relay::server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,range_relay=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ProxyConfig::from_env();
    let listen_addr = config.listen_addr;
    let state = AppState::new(config).context("failed to build upstream HTTP client")?;

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    tracing::info!(addr = %listen_addr, "range-relay listening");

    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}
