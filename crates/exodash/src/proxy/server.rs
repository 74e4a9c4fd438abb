//! Proxy server startup

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::serve;
use exolog::request_log::RequestLog;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{create_router, ProxyState};
use crate::config::Config;

/// Bind and serve until Ctrl-C
pub async fn start_server(config: &Config) -> Result<()> {
  let log_path = config.proxy_log_file();
  let log = RequestLog::open(&log_path).with_context(|| format!("opening request log {}", log_path.display()))?;
  let state = Arc::new(ProxyState::new(&config.proxy, log.clone())?);

  let addr = config.proxy.bind;
  let app = create_router(state)
    .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()));

  let listener = TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
  log
    .info(
      &format!("ml-proxy listening on {addr}, forwarding to {} ({}s timeout)", config.proxy.upstream, config.proxy.timeout_secs),
      "ml-proxy",
    )
    .await;

  match serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
    Ok(()) => {
      log.info("ml-proxy shut down", "ml-proxy").await;
      Ok(())
    }
    Err(e) => {
      log.error(&format!("server error: {e}"), "ml-proxy").await;
      Err(anyhow::anyhow!("server error: {e}"))
    }
  }
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
}
