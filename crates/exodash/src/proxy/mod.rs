//! Reverse proxy in front of the ML service
//!
//! Forwards `/api/ml-proxy/*` to the upstream with the prefix stripped and a
//! fixed upper bound on how long the upstream may take. Every request is
//! written to a JSONL request log that `/logs` serves back.

pub mod handlers;
pub mod middleware;
pub mod routing;
pub mod server;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use exolog::request_log::RequestLog;
use url::Url;

use crate::config::ProxyConfig;

pub use routing::create_router;
pub use server::start_server;

/// Path prefix removed before forwarding
pub const PROXY_PREFIX: &str = "/api/ml-proxy";

/// Shared by every handler
pub struct ProxyState {
  pub client: reqwest::Client,
  pub upstream: Url,
  pub timeout: Duration,
  pub log: RequestLog,
  pub started: Instant,
}

impl ProxyState {
  pub fn new(config: &ProxyConfig, log: RequestLog) -> Result<Self> {
    let upstream = Url::parse(&config.upstream)
      .with_context(|| format!("invalid upstream URL '{}'", config.upstream))?;
    let client = reqwest::Client::builder()
      .redirect(reqwest::redirect::Policy::none())
      .build()
      .context("building upstream client")?;

    Ok(Self {
      client,
      upstream,
      timeout: Duration::from_secs(config.timeout_secs),
      log,
      started: Instant::now(),
    })
  }

  /// Upstream URL for a proxied path (prefix already stripped) and query
  pub fn target(&self, path: &str, query: Option<&str>) -> Result<Url, url::ParseError> {
    let base = self.upstream.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match query {
      Some(q) if !q.is_empty() => Url::parse(&format!("{base}/{path}?{q}")),
      _ => Url::parse(&format!("{base}/{path}")),
    }
  }
}
