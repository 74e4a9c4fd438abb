//! reqwest implementation of [`DatasetApi`]

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{ApiError, DatasetApi};
use crate::model::{
  ClassificationResult, Features, HealthStatus, RemoveRowRequest, Row, RowId, SaveResponse,
  SplitRequest, SplitResponse, TaskId, TaskStatus,
};

/// Where the ML service lives and how long to wait for it
#[derive(Debug, Clone)]
pub struct ClientConfig {
  /// Base URL, e.g. "http://127.0.0.1:5001" or a proxy prefix such as
  /// "http://127.0.0.1:3000/api/ml-proxy"
  pub base_url: String,
  /// Per-request timeout in seconds
  pub timeout_secs: u64,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self { base_url: "http://127.0.0.1:5001".to_string(), timeout_secs: 90 }
  }
}

/// Error body the service returns alongside 4xx/5xx statuses
#[derive(Debug, Deserialize)]
struct ErrorBody {
  error: String,
  #[serde(default)]
  details: Option<String>,
}

pub struct HttpDatasetApi {
  client: Client,
  base_url: Url,
  timeout: Duration,
}

impl HttpDatasetApi {
  pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| ApiError::malformed(format!("invalid server URL '{}': {e}", config.base_url)))?;
    if base_url.cannot_be_a_base() {
      return Err(ApiError::malformed(format!("'{}' cannot be used as a base URL", config.base_url)));
    }

    let timeout = Duration::from_secs(config.timeout_secs);
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| ApiError::unreachable(format!("failed to build HTTP client: {e}")))?;

    Ok(Self { client, base_url, timeout })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn endpoint(&self, segments: &[&str]) -> Url {
    let mut url = self.base_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, ApiError> {
    tracing::debug!(what, "sending request");
    let response = request.send().await.map_err(|e| {
      if e.is_timeout() {
        ApiError::unreachable(format!("{what} timed out after {}s", self.timeout.as_secs()))
      } else {
        ApiError::unreachable(format!("{what}: {e}"))
      }
    })?;

    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    if status == StatusCode::GATEWAY_TIMEOUT {
      tracing::warn!(what, "gateway timeout");
      return Err(ApiError::GatewayTimeout);
    }

    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
      Ok(ErrorBody { error, details: Some(details) }) => format!("{error}: {details}"),
      Ok(ErrorBody { error, details: None }) => error,
      Err(_) if !text.trim().is_empty() => text.trim().to_string(),
      Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
    };
    tracing::warn!(what, status = status.as_u16(), %message, "request rejected");
    Err(ApiError::rejected(status.as_u16(), message))
  }

  async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, ApiError> {
    let response = self.send(request, what).await?;
    let bytes = response
      .bytes()
      .await
      .map_err(|e| ApiError::unreachable(format!("{what}: failed to read response: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::malformed(format!("{what}: {e}")))
  }
}

#[async_trait]
impl DatasetApi for HttpDatasetApi {
  async fn fetch_training(&self) -> Result<Vec<Row>, ApiError> {
    let url = self.endpoint(&["data", "dataset"]);
    self.send_json(self.client.get(url), "load training collection").await
  }

  async fn fetch_held_out(&self) -> Result<Vec<Row>, ApiError> {
    let url = self.endpoint(&["data", "held_out"]);
    self.send_json(self.client.get(url), "load held-out collection").await
  }

  async fn replace_held_out(&self, rows: &[Row]) -> Result<(), ApiError> {
    let url = self.endpoint(&["data", "held_out"]);
    self.send(self.client.put(url).json(rows), "replace held-out collection").await?;
    Ok(())
  }

  async fn save_training(&self, rows: &[Row]) -> Result<SaveResponse, ApiError> {
    let url = self.endpoint(&["data", "save_dataset"]);
    let response = self.send(self.client.put(url).json(rows), "save training collection").await?;
    let text = response
      .text()
      .await
      .map_err(|e| ApiError::unreachable(format!("save training collection: {e}")))?;
    if text.trim().is_empty() {
      return Ok(SaveResponse::default());
    }
    serde_json::from_str(&text)
      .map_err(|e| ApiError::malformed(format!("save training collection: {e}")))
  }

  async fn split_dataset(&self, holdout_percentage: u8) -> Result<SplitResponse, ApiError> {
    let url = self.endpoint(&["data", "split_dataset"]);
    let body = SplitRequest { holdout_percentage };
    self.send_json(self.client.post(url).json(&body), "split dataset").await
  }

  async fn task_status(&self, task_id: &TaskId) -> Result<TaskStatus, ApiError> {
    let url = self.endpoint(&["vector_task_status", task_id.as_str()]);
    self.send_json(self.client.get(url), "poll index rebuild").await
  }

  async fn upload_user_data(&self, file_name: &str, contents: Vec<u8>) -> Result<Vec<Row>, ApiError> {
    let url = self.endpoint(&["data", "upload_user_data"]);
    let part = reqwest::multipart::Part::bytes(contents)
      .file_name(file_name.to_string())
      .mime_str("text/csv")
      .map_err(|e| ApiError::malformed(format!("upload user data: {e}")))?;
    let form = reqwest::multipart::Form::new().part("file", part);
    self.send_json(self.client.post(url).multipart(form), "upload user data").await
  }

  async fn remove_row(&self, id: &RowId) -> Result<(), ApiError> {
    let url = self.endpoint(&["data", "remove_row"]);
    let body = RemoveRowRequest { id: id.clone() };
    self.send(self.client.delete(url).json(&body), "remove row").await?;
    Ok(())
  }

  async fn predict(&self, features: &Features) -> Result<ClassificationResult, ApiError> {
    let url = self.endpoint(&["predict"]);
    let result: ClassificationResult =
      self.send_json(self.client.post(url).json(features), "classify").await?;
    result.check().map_err(ApiError::malformed)?;
    Ok(result)
  }

  async fn health(&self) -> Result<HealthStatus, ApiError> {
    let url = self.endpoint(&["health"]);
    self.send_json(self.client.get(url), "health check").await
  }
}
