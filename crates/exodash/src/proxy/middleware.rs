//! Request id and request log middleware

use std::sync::Arc;
use std::time::Instant;

use axum::{
  extract::{Request, State},
  http::HeaderValue,
  middleware::Next,
  response::Response,
};
use exolog::request_log::RequestInfo;
use uuid::Uuid;

use super::ProxyState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request metadata, available to handlers as an extension
#[derive(Debug, Clone)]
pub struct RequestContext {
  pub request_id: Uuid,
  pub method: String,
  pub path: String,
  pub started: Instant,
}

impl RequestContext {
  pub fn info(&self) -> RequestInfo {
    RequestInfo {
      request_id: self.request_id.to_string(),
      method: self.method.clone(),
      path: self.path.clone(),
      ..Default::default()
    }
  }

  pub fn elapsed_ms(&self) -> f64 {
    self.started.elapsed().as_secs_f64() * 1000.0
  }
}

/// Tag the request with an id, log its completion, echo the id back
pub async fn request_log(State(state): State<Arc<ProxyState>>, mut request: Request, next: Next) -> Response {
  let context = RequestContext {
    request_id: Uuid::new_v4(),
    method: request.method().to_string(),
    path: request.uri().path().to_string(),
    started: Instant::now(),
  };
  request.extensions_mut().insert(context.clone());

  let mut response = next.run(request).await;

  let status = response.status();
  let info = RequestInfo { status: Some(status.as_u16()), duration_ms: Some(context.elapsed_ms()), ..context.info() };
  let level = if status.is_server_error() {
    "error"
  } else if status.is_client_error() {
    "warn"
  } else {
    "info"
  };
  let message = format!("{} {} -> {}", context.method, context.path, status.as_u16());
  state.log.record(level, &message, "http-request", Some(info)).await;

  if let Ok(value) = HeaderValue::from_str(&context.request_id.to_string()) {
    response.headers_mut().insert(REQUEST_ID_HEADER, value);
  }
  response
}
