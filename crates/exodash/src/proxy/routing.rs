//! Axum router for the proxy

use std::sync::Arc;

use axum::{
  extract::DefaultBodyLimit,
  middleware,
  routing::{any, get},
  Router,
};

use super::{handlers, ProxyState};

pub fn create_router(state: Arc<ProxyState>) -> Router {
  Router::new()
    .route("/status", get(handlers::status))
    .route("/logs", get(handlers::logs))
    .route("/api/ml-proxy", any(handlers::forward))
    .route("/api/ml-proxy/", any(handlers::forward))
    .route("/api/ml-proxy/{*path}", any(handlers::forward))
    // dataset uploads and full-collection writes can be several MiB
    .layer(DefaultBodyLimit::disable())
    .layer(middleware::from_fn_with_state(Arc::clone(&state), super::middleware::request_log))
    .with_state(state)
}
