//! Wire types for the dataset write endpoints and the index rebuild task

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a server-side vector index rebuild
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
  Pending,
  Started,
  Progress,
  Success,
  Failure,
  #[serde(other)]
  Unknown,
}

impl TaskState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, TaskState::Success | TaskState::Failure)
  }
}

/// Body of `GET /vector_task_status/{task_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
  pub status: TaskState,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub progress: Option<f32>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
}

impl TaskStatus {
  pub fn pending() -> Self {
    Self { status: TaskState::Pending, progress: None, error_message: None }
  }
}

/// Body of `POST /data/split_dataset`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRequest {
  pub holdout_percentage: u8,
}

/// Response of `POST /data/split_dataset`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitResponse {
  pub training_count: usize,
  pub held_out_count: usize,

  #[serde(default)]
  pub task_id: Option<TaskId>,
}

/// Response of `PUT /data/save_dataset`; the task id is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResponse {
  #[serde(default)]
  pub task_id: Option<TaskId>,

  #[serde(default)]
  pub message: Option<String>,
}

/// Body of `DELETE /data/remove_row`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRowRequest {
  pub id: crate::model::RowId,
}

/// Response of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
  pub status: String,

  #[serde(default)]
  pub llm_available: Option<bool>,

  #[serde(default)]
  pub models_loaded: Option<u32>,
}
