//! Polling the server-side vector index rebuild
//!
//! A split or save may hand back a task id. [`TaskPoller::watch`] spawns a
//! loop that asks for its status on a fixed interval until it reaches a
//! terminal state. The loop lives exactly as long as its [`TaskHandle`]:
//! dropping the handle cancels it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::{ApiError, DatasetApi};
use crate::model::{TaskId, TaskState, TaskStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Consecutive unreachable polls tolerated before giving up
pub const MAX_UNREACHABLE_POLLS: u32 = 3;

#[derive(Debug, Error)]
pub enum TaskError {
  #[error("Vector store build failed: {message}")]
  Failed { message: String },

  #[error("Task polling cancelled")]
  Cancelled,

  #[error("Task did not finish within {}s", after.as_secs())]
  TimedOut { after: Duration },

  #[error(transparent)]
  Api(#[from] ApiError),

  #[error("Task poller stopped unexpectedly: {message}")]
  Aborted { message: String },
}

#[derive(Clone)]
pub struct TaskPoller {
  api: Arc<dyn DatasetApi>,
  interval: Duration,
  deadline: Option<Duration>,
}

impl TaskPoller {
  pub fn new(api: Arc<dyn DatasetApi>) -> Self {
    Self { api, interval: DEFAULT_POLL_INTERVAL, deadline: None }
  }

  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  /// Give up once this much time has passed since the first poll
  pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
    self.deadline = deadline;
    self
  }

  /// Start polling `task_id` in the background. Must be called inside a tokio runtime.
  pub fn watch(&self, task_id: TaskId) -> TaskHandle {
    let cancel = CancellationToken::new();
    let (progress_tx, progress) = watch::channel(TaskStatus::pending());

    let poll = PollLoop {
      api: Arc::clone(&self.api),
      task_id: task_id.clone(),
      interval: self.interval,
      deadline: self.deadline,
      cancel: cancel.clone(),
      progress: progress_tx,
    };
    let join = tokio::spawn(poll.run());

    tracing::debug!(%task_id, interval_ms = self.interval.as_millis() as u64, "watching task");
    TaskHandle { task_id, cancel, progress, join: Some(join) }
  }
}

/// Owner of a running poll loop. Dropping it stops the loop.
pub struct TaskHandle {
  task_id: TaskId,
  cancel: CancellationToken,
  progress: watch::Receiver<TaskStatus>,
  join: Option<JoinHandle<Result<TaskStatus, TaskError>>>,
}

impl TaskHandle {
  pub fn task_id(&self) -> &TaskId {
    &self.task_id
  }

  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Receiver for every status the loop observes
  pub fn progress(&self) -> watch::Receiver<TaskStatus> {
    self.progress.clone()
  }

  pub fn latest(&self) -> TaskStatus {
    self.progress.borrow().clone()
  }

  /// Wait for a terminal state. Dropping this future cancels the loop.
  pub async fn wait(mut self) -> Result<TaskStatus, TaskError> {
    let Some(join) = self.join.take() else {
      return Err(TaskError::Cancelled);
    };
    match join.await {
      Ok(result) => result,
      Err(e) => Err(TaskError::Aborted { message: e.to_string() }),
    }
  }
}

impl Drop for TaskHandle {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

struct PollLoop {
  api: Arc<dyn DatasetApi>,
  task_id: TaskId,
  interval: Duration,
  deadline: Option<Duration>,
  cancel: CancellationToken,
  progress: watch::Sender<TaskStatus>,
}

impl PollLoop {
  async fn run(self) -> Result<TaskStatus, TaskError> {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut unreachable = 0u32;

    loop {
      tokio::select! {
        biased;
        _ = self.cancel.cancelled() => {
          tracing::debug!(task_id = %self.task_id, "poll cancelled");
          return Err(TaskError::Cancelled);
        }
        _ = ticker.tick() => {}
      }

      if let Some(deadline) = self.deadline {
        if started.elapsed() >= deadline {
          tracing::warn!(task_id = %self.task_id, "task deadline passed");
          return Err(TaskError::TimedOut { after: deadline });
        }
      }

      let response = tokio::select! {
        biased;
        _ = self.cancel.cancelled() => return Err(TaskError::Cancelled),
        response = self.api.task_status(&self.task_id) => response,
      };

      match response {
        Ok(status) => {
          unreachable = 0;
          tracing::debug!(task_id = %self.task_id, state = ?status.status, progress = ?status.progress, "poll");
          self.progress.send_replace(status.clone());
          match status.status {
            TaskState::Success => return Ok(status),
            TaskState::Failure => {
              let message = status.error_message.unwrap_or_else(|| "unknown error".to_string());
              return Err(TaskError::Failed { message });
            }
            _ => {}
          }
        }
        Err(e) if e.is_retryable() && unreachable + 1 < MAX_UNREACHABLE_POLLS => {
          unreachable += 1;
          tracing::warn!(task_id = %self.task_id, error = %e, attempt = unreachable, "status poll failed, retrying");
        }
        Err(e) => return Err(e.into()),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::client::MockDatasetApi;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn status(state: TaskState, progress: Option<f32>) -> TaskStatus {
    TaskStatus { status: state, progress, error_message: None }
  }

  fn counting(api: &mut MockDatasetApi, reply: impl Fn(usize) -> Result<TaskStatus, ApiError> + Send + 'static) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    api.expect_task_status().returning(move |_| reply(counter.fetch_add(1, Ordering::SeqCst)));
    calls
  }

  #[tokio::test(start_paused = true)]
  async fn dropping_the_handle_stops_polling() {
    let mut api = MockDatasetApi::new();
    let calls = counting(&mut api, |_| Ok(TaskStatus::pending()));

    let handle = TaskPoller::new(Arc::new(api)).watch(TaskId::new("never-done"));
    tokio::time::sleep(Duration::from_secs(5)).await;
    let seen = calls.load(Ordering::SeqCst);
    assert!(seen >= 2, "expected polling every 2s, saw {seen}");

    drop(handle);
    tokio::task::yield_now().await;
    let at_teardown = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), at_teardown);
  }

  #[tokio::test(start_paused = true)]
  async fn reports_progress_until_success() {
    let mut api = MockDatasetApi::new();
    counting(&mut api, |n| {
      Ok(match n {
        0 => status(TaskState::Started, None),
        1 => status(TaskState::Progress, Some(50.0)),
        _ => status(TaskState::Success, Some(100.0)),
      })
    });

    let handle = TaskPoller::new(Arc::new(api)).watch(TaskId::new("t-1"));
    let progress = handle.progress();
    let done = handle.wait().await.unwrap();
    assert_eq!(done.status, TaskState::Success);
    assert_eq!(progress.borrow().progress, Some(100.0));
  }

  #[tokio::test(start_paused = true)]
  async fn failure_carries_server_message() {
    let mut api = MockDatasetApi::new();
    counting(&mut api, |_| {
      Ok(TaskStatus {
        status: TaskState::Failure,
        progress: None,
        error_message: Some("embedding model missing".into()),
      })
    });

    let err = TaskPoller::new(Arc::new(api)).watch(TaskId::new("t-2")).wait().await.unwrap_err();
    assert!(matches!(&err, TaskError::Failed { message } if message == "embedding model missing"));
  }

  #[tokio::test(start_paused = true)]
  async fn tolerates_brief_outages() {
    let mut api = MockDatasetApi::new();
    let calls = counting(&mut api, |n| match n {
      0 | 1 => Err(ApiError::unreachable("refused")),
      _ => Ok(status(TaskState::Success, None)),
    });

    let done = TaskPoller::new(Arc::new(api)).watch(TaskId::new("t-3")).wait().await.unwrap();
    assert_eq!(done.status, TaskState::Success);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn gives_up_after_repeated_outages_or_rejection() {
    let mut api = MockDatasetApi::new();
    let calls = counting(&mut api, |_| Err(ApiError::unreachable("refused")));
    let err = TaskPoller::new(Arc::new(api)).watch(TaskId::new("t-4")).wait().await.unwrap_err();
    assert!(matches!(err, TaskError::Api(ApiError::Unreachable { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), MAX_UNREACHABLE_POLLS as usize);

    let mut api = MockDatasetApi::new();
    let calls = counting(&mut api, |_| Err(ApiError::rejected(404, "Task not found")));
    let err = TaskPoller::new(Arc::new(api)).watch(TaskId::new("t-5")).wait().await.unwrap_err();
    assert!(matches!(err, TaskError::Api(ApiError::Rejected { status: 404, .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn deadline_ends_the_poll() {
    let mut api = MockDatasetApi::new();
    counting(&mut api, |_| Ok(TaskStatus::pending()));

    let poller = TaskPoller::new(Arc::new(api)).with_deadline(Some(Duration::from_secs(7)));
    let err = poller.watch(TaskId::new("t-6")).wait().await.unwrap_err();
    assert!(matches!(err, TaskError::TimedOut { .. }));
  }

  #[tokio::test(start_paused = true)]
  async fn explicit_cancel_resolves_wait() {
    let mut api = MockDatasetApi::new();
    counting(&mut api, |_| Ok(TaskStatus::pending()));

    let handle = TaskPoller::new(Arc::new(api)).watch(TaskId::new("t-7"));
    handle.cancel();
    assert!(handle.is_cancelled());
    assert!(matches!(handle.wait().await, Err(TaskError::Cancelled)));
  }
}
