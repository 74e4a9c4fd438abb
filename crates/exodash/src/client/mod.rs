//! Remote collaborators of the dashboard
//!
//! [`DatasetApi`] is the seam between the partition manager, classifier and
//! task poller on one side and the ML service on the other. [`http`] provides
//! the reqwest implementation; tests substitute in-memory fakes.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
  ClassificationResult, Features, HealthStatus, Row, RowId, SaveResponse, SplitResponse, TaskId,
  TaskStatus,
};

pub use http::{ClientConfig, HttpDatasetApi};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
  #[error("Could not reach server: {message}")]
  Unreachable { message: String },

  #[error("Server rejected request ({status}): {message}")]
  Rejected { status: u16, message: String },

  #[error("Gateway timeout: the ML service did not answer in time")]
  GatewayTimeout,

  #[error("Unexpected response from server: {message}")]
  Malformed { message: String },
}

impl ApiError {
  pub fn unreachable(message: impl Into<String>) -> Self {
    Self::Unreachable { message: message.into() }
  }

  pub fn rejected(status: u16, message: impl Into<String>) -> Self {
    Self::Rejected { status, message: message.into() }
  }

  pub fn malformed(message: impl Into<String>) -> Self {
    Self::Malformed { message: message.into() }
  }

  /// Worth offering a retry: the request may never have reached the service
  pub fn is_retryable(&self) -> bool {
    matches!(self, ApiError::Unreachable { .. } | ApiError::GatewayTimeout)
  }
}

/// HTTP contract of the ML service's dataset, task and prediction endpoints
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatasetApi: Send + Sync {
  /// `GET /data/dataset`: the training collection
  async fn fetch_training(&self) -> Result<Vec<Row>, ApiError>;

  /// `GET /data/held_out`
  async fn fetch_held_out(&self) -> Result<Vec<Row>, ApiError>;

  /// `PUT /data/held_out`: replaces the whole held-out collection
  async fn replace_held_out(&self, rows: &[Row]) -> Result<(), ApiError>;

  /// `PUT /data/save_dataset`: replaces the whole training collection
  async fn save_training(&self, rows: &[Row]) -> Result<SaveResponse, ApiError>;

  /// `POST /data/split_dataset`. A percentage of 0 folds everything back into training.
  async fn split_dataset(&self, holdout_percentage: u8) -> Result<SplitResponse, ApiError>;

  /// `GET /vector_task_status/{task_id}`
  async fn task_status(&self, task_id: &TaskId) -> Result<TaskStatus, ApiError>;

  /// `POST /data/upload_user_data`: returns the refreshed training collection
  async fn upload_user_data(&self, file_name: &str, contents: Vec<u8>) -> Result<Vec<Row>, ApiError>;

  /// `DELETE /data/remove_row`
  async fn remove_row(&self, id: &RowId) -> Result<(), ApiError>;

  /// `POST /predict`
  async fn predict(&self, features: &Features) -> Result<ClassificationResult, ApiError>;

  /// `GET /health`
  async fn health(&self) -> Result<HealthStatus, ApiError>;
}
