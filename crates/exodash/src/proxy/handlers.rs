//! Proxy, status and log handlers

use std::sync::Arc;

use axum::{
  body::Bytes,
  extract::{Extension, Query, State},
  http::{HeaderMap, HeaderName, Method, StatusCode, Uri},
  response::{IntoResponse, Json, Response},
};
use exolog::request_log::{LogEntry, RequestInfo};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::middleware::RequestContext;
use super::{ProxyState, PROXY_PREFIX};

// connection-level headers are never forwarded in either direction
fn is_hop_by_hop(name: &HeaderName) -> bool {
  matches!(
    name.as_str(),
    "connection"
      | "keep-alive"
      | "host"
      | "content-length"
      | "proxy-authenticate"
      | "proxy-authorization"
      | "te"
      | "trailer"
      | "transfer-encoding"
      | "upgrade"
  )
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
  let mut out = HeaderMap::with_capacity(headers.len());
  for (name, value) in headers {
    if is_hop_by_hop(name) {
      continue;
    }
    out.append(name.clone(), value.clone());
  }
  out
}

fn error_response(status: StatusCode, error: &str, details: impl Into<String>) -> Response {
  (status, Json(json!({ "error": error, "details": details.into() }))).into_response()
}

struct Upstream {
  status: StatusCode,
  headers: HeaderMap,
  body: Bytes,
}

enum Failure {
  Timeout,
  Transport(reqwest::Error),
}

/// ANY /api/ml-proxy/{*path}
pub async fn forward(
  State(state): State<Arc<ProxyState>>,
  Extension(context): Extension<RequestContext>,
  method: Method,
  uri: Uri,
  headers: HeaderMap,
  body: Bytes,
) -> Response {
  let path = uri.path().strip_prefix(PROXY_PREFIX).unwrap_or(uri.path());
  let target = match state.target(path, uri.query()) {
    Ok(target) => target,
    Err(e) => return error_response(StatusCode::BAD_REQUEST, "Invalid proxy path", e.to_string()),
  };
  tracing::debug!(request_id = %context.request_id, %method, %target, "forwarding");

  let request = state.client.request(method, target.clone()).headers(forwardable(&headers)).body(body);
  let exchange = async {
    let response = request.send().await?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?;
    Ok::<_, reqwest::Error>(Upstream { status, headers, body })
  };

  let outcome = match tokio::time::timeout(state.timeout, exchange).await {
    Ok(Ok(upstream)) => Ok(upstream),
    Ok(Err(e)) if e.is_timeout() => Err(Failure::Timeout),
    Ok(Err(e)) => Err(Failure::Transport(e)),
    Err(_) => Err(Failure::Timeout),
  };

  match outcome {
    Ok(upstream) => {
      let mut response = (upstream.status, upstream.body).into_response();
      *response.headers_mut() = forwardable(&upstream.headers);
      response
    }
    Err(failure) => {
      let info = RequestInfo { upstream: Some(target.to_string()), ..context.info() };
      match failure {
        Failure::Timeout => {
          let secs = state.timeout.as_secs();
          tracing::warn!(request_id = %context.request_id, %target, secs, "upstream timed out");
          state.log.record("warn", &format!("upstream timed out after {secs}s"), "ml-proxy", Some(info)).await;
          error_response(
            StatusCode::GATEWAY_TIMEOUT,
            "Gateway timeout",
            format!("ML service did not respond within {secs} seconds"),
          )
        }
        Failure::Transport(e) => {
          tracing::error!(request_id = %context.request_id, %target, error = %e, "upstream unreachable");
          state.log.record("error", &format!("upstream error: {e}"), "ml-proxy", Some(info)).await;
          error_response(StatusCode::BAD_GATEWAY, "Proxy error", e.to_string())
        }
      }
    }
  }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
  pub status: String,
  pub version: String,
  pub upstream: String,
  pub timeout_secs: u64,
  pub uptime_secs: u64,
}

/// GET /status
pub async fn status(State(state): State<Arc<ProxyState>>) -> Json<StatusResponse> {
  Json(StatusResponse {
    status: "healthy".to_string(),
    version: env!("CARGO_PKG_VERSION").to_string(),
    upstream: state.upstream.to_string(),
    timeout_secs: state.timeout.as_secs(),
    uptime_secs: state.started.elapsed().as_secs(),
  })
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
  pub limit: Option<usize>,
  pub level: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
  pub logs: Vec<LogEntry>,
}

/// GET /logs?limit=&level=
pub async fn logs(
  State(state): State<Arc<ProxyState>>,
  Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, Response> {
  let limit = query.limit.unwrap_or(100);
  match state.log.recent(Some(limit), query.level.as_deref()).await {
    Ok(logs) => Ok(Json(LogsResponse { logs })),
    Err(e) => {
      tracing::error!(error = %e, "failed to read request log");
      Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read logs", e.to_string()))
    }
  }
}
