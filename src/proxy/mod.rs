//! Pin registry proxy: a stateless HTTP façade over the storage daemon.

mod daemon;
mod error;
mod handlers;

use std::net::SocketAddr;
use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use crate::config::ProxyConfig;

pub use daemon::{DaemonClient, DaemonError, DaemonSession, UNKNOWN_PIN_TYPE};
pub use error::{AddFailure, ProxyError};
pub use handlers::AppState;

/// Build the proxy routes. The API lives under `config.api_prefix`.
pub fn router(config: &ProxyConfig) -> anyhow::Result<Router> {
    let daemon = DaemonClient::new(&config.daemon_api_url, config.daemon_timeout)?;
    let state = AppState {
        daemon,
        max_upload_bytes: config.max_upload_bytes,
    };

    let api = Router::new()
        .route("/add", post(handlers::add_files))
        .route("/unpin", post(handlers::unpin))
        .route("/pins", get(handlers::list_pins))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes));

    let prefix = format!("/{}", config.api_prefix.trim_matches('/'));
    let app = Router::new().route("/", get(handlers::root));
    let app = if prefix == "/" { app.merge(api) } else { app.nest(&prefix, api) };

    Ok(app.with_state(state))
}

/// Bind `config.listen_addr` and serve until ctrl-c.
pub async fn serve(config: ProxyConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.listen_addr))?;
    let app = router(&config)?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(
        %addr,
        daemon = %config.daemon_api_url,
        prefix = %config.api_prefix,
        "pin registry proxy listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
