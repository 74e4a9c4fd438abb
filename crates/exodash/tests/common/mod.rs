#![allow(dead_code)]

use async_trait::async_trait;
use exodash::client::{ApiError, DatasetApi};
use exodash::model::{
  ClassificationResult, Disposition, Features, HealthStatus, Provenance, Row, RowId, SaveResponse,
  SplitResponse, TaskId, TaskState, TaskStatus,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory ML service holding the two server-side collections
pub struct FakeBackend {
  store: Mutex<Store>,
  failures: Mutex<HashMap<&'static str, Vec<Option<ApiError>>>>,
  calls: Mutex<HashMap<&'static str, u32>>,
}

#[derive(Default)]
struct Store {
  training: Vec<Row>,
  held_out: Vec<Row>,
  next_task: u32,
}

pub fn row(id: &str) -> Row {
  Row {
    provenance: Provenance::Koi,
    id: RowId::new(id),
    name: Some(format!("K{id:0>5}.01")),
    disposition: Some(Disposition::Candidate),
    raw_disposition: None,
    period: Some(9.49),
    duration: Some(2.96),
    depth: Some(615.8),
    prad: Some(2.26),
    teq: Some(793.0),
  }
}

pub fn rows(ids: std::ops::Range<u32>) -> Vec<Row> {
  ids.map(|i| row(&i.to_string())).collect()
}

pub fn ids(rows: &[Row]) -> Vec<String> {
  rows.iter().map(|r| r.id.to_string()).collect()
}

impl FakeBackend {
  pub fn new(training: Vec<Row>, held_out: Vec<Row>) -> Self {
    Self {
      store: Mutex::new(Store { training, held_out, next_task: 0 }),
      failures: Mutex::new(HashMap::new()),
      calls: Mutex::new(HashMap::new()),
    }
  }

  /// Make the next call to `endpoint` fail with `error`
  pub fn fail_next(&self, endpoint: &'static str, error: ApiError) {
    self.failures.lock().unwrap().entry(endpoint).or_default().push(Some(error));
  }

  /// Let the next call to `endpoint` through; only meaningful before a queued failure
  pub fn pass_next(&self, endpoint: &'static str) {
    self.failures.lock().unwrap().entry(endpoint).or_default().push(None);
  }

  pub fn calls(&self, endpoint: &'static str) -> u32 {
    self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
  }

  pub fn total_calls(&self) -> u32 {
    self.calls.lock().unwrap().values().sum()
  }

  pub fn training(&self) -> Vec<Row> {
    self.store.lock().unwrap().training.clone()
  }

  pub fn held_out(&self) -> Vec<Row> {
    self.store.lock().unwrap().held_out.clone()
  }

  fn enter(&self, endpoint: &'static str) -> Result<(), ApiError> {
    *self.calls.lock().unwrap().entry(endpoint).or_insert(0) += 1;
    let mut failures = self.failures.lock().unwrap();
    match failures.get_mut(endpoint) {
      Some(queue) if !queue.is_empty() => match queue.remove(0) {
        Some(error) => Err(error),
        None => Ok(()),
      },
      _ => Ok(()),
    }
  }

  fn task(store: &mut Store) -> TaskId {
    store.next_task += 1;
    TaskId::new(format!("task-{}", store.next_task))
  }
}

#[async_trait]
impl DatasetApi for FakeBackend {
  async fn fetch_training(&self) -> Result<Vec<Row>, ApiError> {
    self.enter("fetch_training")?;
    Ok(self.training())
  }

  async fn fetch_held_out(&self) -> Result<Vec<Row>, ApiError> {
    self.enter("fetch_held_out")?;
    Ok(self.held_out())
  }

  async fn replace_held_out(&self, rows: &[Row]) -> Result<(), ApiError> {
    self.enter("replace_held_out")?;
    self.store.lock().unwrap().held_out = rows.to_vec();
    Ok(())
  }

  async fn save_training(&self, rows: &[Row]) -> Result<SaveResponse, ApiError> {
    self.enter("save_training")?;
    let mut store = self.store.lock().unwrap();
    store.training = rows.to_vec();
    let task_id = Self::task(&mut store);
    Ok(SaveResponse { task_id: Some(task_id), message: Some("Dataset saved".into()) })
  }

  async fn split_dataset(&self, holdout_percentage: u8) -> Result<SplitResponse, ApiError> {
    self.enter("split_dataset")?;
    let mut store = self.store.lock().unwrap();
    let mut all = std::mem::take(&mut store.training);
    all.append(&mut store.held_out);

    // deterministic stand-in for a shuffle: every k-th row is held out
    let wanted = all.len() * holdout_percentage as usize / 100;
    let (mut training, mut held_out) = (Vec::new(), Vec::new());
    for (i, row) in all.into_iter().enumerate() {
      if held_out.len() < wanted && i % 5 == 0 {
        held_out.push(row);
      } else {
        training.push(row);
      }
    }
    while held_out.len() < wanted {
      match training.pop() {
        Some(row) => held_out.push(row),
        None => break,
      }
    }

    store.training = training;
    store.held_out = held_out;
    let task_id = Self::task(&mut store);
    Ok(SplitResponse {
      training_count: store.training.len(),
      held_out_count: store.held_out.len(),
      task_id: Some(task_id),
    })
  }

  async fn task_status(&self, _task_id: &TaskId) -> Result<TaskStatus, ApiError> {
    self.enter("task_status")?;
    Ok(TaskStatus { status: TaskState::Success, progress: Some(100.0), error_message: None })
  }

  async fn upload_user_data(&self, _file_name: &str, contents: Vec<u8>) -> Result<Vec<Row>, ApiError> {
    self.enter("upload_user_data")?;
    let uploaded = exodash::loader::parse_dataset(contents.as_slice())
      .map_err(|e| ApiError::rejected(400, e.to_string()))?;
    let mut store = self.store.lock().unwrap();
    store.training.extend(uploaded);
    Ok(store.training.clone())
  }

  async fn remove_row(&self, id: &RowId) -> Result<(), ApiError> {
    self.enter("remove_row")?;
    let mut store = self.store.lock().unwrap();
    let before = store.training.len() + store.held_out.len();
    store.training.retain(|r| &r.id != id);
    store.held_out.retain(|r| &r.id != id);
    if store.training.len() + store.held_out.len() == before {
      return Err(ApiError::rejected(404, "Row not found"));
    }
    Ok(())
  }

  async fn predict(&self, _features: &Features) -> Result<ClassificationResult, ApiError> {
    self.enter("predict")?;
    Ok(ClassificationResult {
      prediction: Disposition::Candidate,
      confidence: 0.9,
      model: "fake".into(),
      similar_examples_used: 0,
      processing_time: "0s".into(),
      similar_examples: Vec::new(),
    })
  }

  async fn health(&self) -> Result<HealthStatus, ApiError> {
    self.enter("health")?;
    Ok(HealthStatus { status: "healthy".into(), llm_available: Some(true), models_loaded: Some(1) })
  }
}
