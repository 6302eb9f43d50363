use std::net::SocketAddr;

use anyhow::Context;

use crate::infra::config::Config;
use crate::infra::http_app::{build_app, AppState};

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    cfg.validate()?;
    tracing::info!(
        port = cfg.port,
        policy = ?cfg.session_policy,
        keep_alive_secs = cfg.keep_alive_secs,
        "BOOT sse-tool-gateway"
    );

    // Duplicate tool names abort startup.
    let registry = crate::tools::build_registry().context("registering tools")?;
    let state = AppState::new(&cfg, registry);
    let sessions = state.sessions.clone();
    let app = build_app(state);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "server is running");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            sessions.shutdown();
        })
        .await?;
    Ok(())
}
