//! The hold-out manager: single owner of the two mirrored collections

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::classify::ClassificationForm;
use crate::client::{ApiError, DatasetApi};
use crate::model::{Disposition, Provenance, Row, RowId, SaveResponse, TaskId};

use super::guard::{InFlight, Operation};
use super::state::{HoldoutPercentage, LoadState, Mode, Partition, Side};
use super::PartitionError;

/// Read-only view handed to tables and commands
#[derive(Debug, Clone)]
pub struct PartitionSnapshot {
  pub mode: Mode,
  pub holdout_percentage: HoldoutPercentage,
  pub load_state: LoadState,
  pub partition: Arc<Partition>,
  pub in_flight: Vec<Operation>,
}

impl PartitionSnapshot {
  pub fn training(&self) -> &[Row] {
    self.partition.training()
  }

  pub fn held_out(&self) -> &[Row] {
    self.partition.held_out()
  }

  pub fn is_test_mode(&self) -> bool {
    self.mode == Mode::Test
  }

  pub fn is_busy(&self, operation: &Operation) -> bool {
    self.in_flight.contains(operation)
  }
}

/// Result of a random split after the mirrors were reloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
  /// Counts reported by the server
  pub training_count: usize,
  pub held_out_count: usize,
  pub task_id: Option<TaskId>,
}

struct ManagerState {
  mode: Mode,
  holdout_percentage: HoldoutPercentage,
  load_state: LoadState,
  partition: Arc<Partition>,
}

pub struct HoldoutManager {
  api: Arc<dyn DatasetApi>,
  state: RwLock<ManagerState>,
  // serializes remote writes so each one starts from the last commit
  writer: Mutex<()>,
  in_flight: InFlight,
}

impl HoldoutManager {
  pub fn new(api: Arc<dyn DatasetApi>) -> Self {
    Self::with_percentage(api, HoldoutPercentage::default())
  }

  pub fn with_percentage(api: Arc<dyn DatasetApi>, holdout_percentage: HoldoutPercentage) -> Self {
    Self {
      api,
      state: RwLock::new(ManagerState {
        mode: Mode::Default,
        holdout_percentage,
        load_state: LoadState::NotLoaded,
        partition: Arc::new(Partition::default()),
      }),
      writer: Mutex::new(()),
      in_flight: InFlight::default(),
    }
  }

  pub fn api(&self) -> &Arc<dyn DatasetApi> {
    &self.api
  }

  pub async fn snapshot(&self) -> PartitionSnapshot {
    let state = self.state.read().await;
    PartitionSnapshot {
      mode: state.mode,
      holdout_percentage: state.holdout_percentage,
      load_state: state.load_state.clone(),
      partition: Arc::clone(&state.partition),
      in_flight: self.in_flight.active(),
    }
  }

  async fn current(&self) -> Arc<Partition> {
    Arc::clone(&self.state.read().await.partition)
  }

  async fn commit(&self, next: Partition) {
    let mut state = self.state.write().await;
    tracing::debug!(training = next.training().len(), held_out = next.held_out().len(), "committed partition");
    state.partition = Arc::new(next);
  }

  /// Fetch both collections from the server and replace the mirrors
  pub async fn reload(&self) -> Result<PartitionSnapshot, PartitionError> {
    let _guard = self.in_flight.begin(Operation::Reload)?;
    let _writer = self.writer.lock().await;

    self.state.write().await.load_state = LoadState::Loading;
    match self.fetch_both().await {
      Ok(partition) => {
        let mut state = self.state.write().await;
        state.partition = Arc::new(partition);
        state.load_state = LoadState::Loaded;
      }
      Err(e) => {
        self.state.write().await.load_state = LoadState::Failed(e.to_string());
        return Err(e.into());
      }
    }
    drop(_writer);
    Ok(self.snapshot().await)
  }

  async fn fetch_both(&self) -> Result<Partition, ApiError> {
    tracing::debug!("fetching training and held-out collections");
    let (training, held_out) = tokio::try_join!(self.api.fetch_training(), self.api.fetch_held_out())?;
    let (partition, dropped) = Partition::from_remote(training, held_out);
    if !dropped.is_empty() {
      tracing::warn!(count = dropped.len(), ids = ?dropped, "server collections overlap, kept held-out copies");
    }
    tracing::info!(
      training = partition.training().len(),
      held_out = partition.held_out().len(),
      "loaded partition"
    );
    Ok(partition)
  }

  /// Show the held-out table. Purely local.
  pub async fn enter_test_mode(&self) {
    self.state.write().await.mode = Mode::Test;
    tracing::info!("entered test mode");
  }

  pub async fn set_holdout_percentage(&self, value: u8) -> Result<HoldoutPercentage, PartitionError> {
    let percentage = HoldoutPercentage::new(value)?;
    self.state.write().await.holdout_percentage = percentage;
    Ok(percentage)
  }

  /// Fold held-out rows back into training on the server, then locally.
  ///
  /// With nothing held out this only switches the mode, so calling it twice
  /// is the same as calling it once.
  pub async fn exit_test_mode(&self) -> Result<Option<TaskId>, PartitionError> {
    let _guard = self.in_flight.begin(Operation::Fold)?;
    let _writer = self.writer.lock().await;

    let loaded = matches!(self.state.read().await.load_state, LoadState::Loaded);
    let current = if loaded {
      self.current().await
    } else {
      // an empty mirror says nothing about what the server holds out
      tracing::info!("partition not loaded, fetching before fold");
      match self.fetch_both().await {
        Ok(partition) => {
          let mut state = self.state.write().await;
          state.partition = Arc::new(partition);
          state.load_state = LoadState::Loaded;
          Arc::clone(&state.partition)
        }
        Err(e) => {
          self.state.write().await.load_state = LoadState::Failed(e.to_string());
          return Err(PartitionError::Remote(e));
        }
      }
    };
    if current.held_out().is_empty() {
      self.state.write().await.mode = Mode::Default;
      tracing::info!("left test mode, nothing held out");
      return Ok(None);
    }

    tracing::info!(held_out = current.held_out().len(), "folding held-out rows into training");
    let response = self.api.split_dataset(0).await.map_err(|e| {
      tracing::error!(error = %e, "fold failed, partition unchanged");
      PartitionError::Remote(e)
    })?;
    if response.held_out_count != 0 {
      tracing::warn!(held_out = response.held_out_count, "server still reports held-out rows after fold");
    }

    let next = current.folded();
    let mut state = self.state.write().await;
    state.partition = Arc::new(next);
    state.mode = Mode::Default;
    Ok(response.task_id)
  }

  /// Ask the server to re-split the whole dataset, then reload both mirrors
  pub async fn random_split(&self) -> Result<SplitOutcome, PartitionError> {
    let _guard = self.in_flight.begin(Operation::Split)?;
    let _writer = self.writer.lock().await;

    let percentage = self.state.read().await.holdout_percentage;
    tracing::info!(%percentage, "requesting random split");
    let response = self.api.split_dataset(percentage.get()).await?;

    let partition = match self.fetch_both().await {
      Ok(partition) => partition,
      Err(source) => {
        tracing::error!(error = %source, "split applied but reload failed");
        self.state.write().await.load_state = LoadState::Failed(source.to_string());
        return Err(PartitionError::Stale { source });
      }
    };

    if partition.training().len() != response.training_count
      || partition.held_out().len() != response.held_out_count
    {
      tracing::warn!(
        reported_training = response.training_count,
        reported_held_out = response.held_out_count,
        training = partition.training().len(),
        held_out = partition.held_out().len(),
        "reloaded counts differ from split response"
      );
    }

    let mut state = self.state.write().await;
    state.partition = Arc::new(partition);
    state.load_state = LoadState::Loaded;
    state.mode = Mode::Test;

    Ok(SplitOutcome {
      training_count: response.training_count,
      held_out_count: response.held_out_count,
      task_id: response.task_id,
    })
  }

  pub async fn move_to_held_out(&self, id: &RowId) -> Result<Option<TaskId>, PartitionError> {
    self.move_row(id, Side::Training).await
  }

  pub async fn move_to_training(&self, id: &RowId) -> Result<Option<TaskId>, PartitionError> {
    self.move_row(id, Side::HeldOut).await
  }

  async fn move_row(&self, id: &RowId, from: Side) -> Result<Option<TaskId>, PartitionError> {
    let _guard = self.in_flight.begin(Operation::Move(id.clone()))?;
    let _writer = self.writer.lock().await;

    let current = self.current().await;
    let next = current.with_moved(id, from)?;
    tracing::info!(%id, %from, to = %from.other(), "moving row");

    let saved = self.write_both(&current, &next).await?;
    self.commit(next).await;
    Ok(saved.task_id)
  }

  /// Persist both collections of `next` as one unit.
  ///
  /// When exactly one request fails, the half that landed is rewritten with
  /// its `previous` contents so the server matches the uncommitted mirror.
  async fn write_both(&self, previous: &Partition, next: &Partition) -> Result<SaveResponse, PartitionError> {
    let (held_out, training) = tokio::join!(
      self.api.replace_held_out(next.held_out()),
      self.api.save_training(next.training())
    );

    let (cause, compensation) = match (held_out, training) {
      (Ok(()), Ok(saved)) => return Ok(saved),
      (Err(cause), Err(other)) => {
        tracing::warn!(error = %cause, other = %other, "both writes failed, nothing to undo");
        return Err(PartitionError::Remote(cause));
      }
      (Err(cause), Ok(_)) => {
        tracing::warn!(error = %cause, "held-out write failed, restoring training");
        (cause, self.api.save_training(previous.training()).await.map(|_| ()))
      }
      (Ok(()), Err(cause)) => {
        tracing::warn!(error = %cause, "training write failed, restoring held-out");
        (cause, self.api.replace_held_out(previous.held_out()).await)
      }
    };

    match compensation {
      Ok(()) => {
        tracing::info!("rolled back");
        Err(PartitionError::Remote(cause))
      }
      Err(compensation) => {
        tracing::error!(error = %cause, restore = %compensation, "rollback failed, server diverged");
        self.state.write().await.load_state = LoadState::Failed(compensation.to_string());
        Err(PartitionError::Diverged { cause, compensation })
      }
    }
  }

  /// Copy a row's features into a fresh classification form. Any row may be
  /// tested, whichever collection it is in.
  pub async fn test_row(&self, id: &RowId) -> Result<ClassificationForm, PartitionError> {
    let current = self.current().await;
    let (_, row) =
      current.locate(id).ok_or_else(|| PartitionError::RowNotFound { id: id.clone(), side: None })?;
    Ok(ClassificationForm::from_row(row))
  }

  /// Validate the form and append a user row to training
  pub async fn add_user_row(
    &self,
    form: &ClassificationForm,
    disposition: Disposition,
  ) -> Result<(Row, Option<TaskId>), PartitionError> {
    let features = form.validate()?;
    let _guard = self.in_flight.begin(Operation::AddRow)?;
    let _writer = self.writer.lock().await;

    let current = self.current().await;
    let ordinal = current
      .training()
      .iter()
      .chain(current.held_out())
      .filter(|r| r.provenance == Provenance::User)
      .count()
      + 1;
    let row = Row::user_submitted(features, disposition, ordinal);
    let next = current.with_appended(row.clone())?;

    tracing::info!(id = %row.id, "adding user row");
    let saved = self.api.save_training(next.training()).await?;
    self.commit(next).await;
    Ok((row, saved.task_id))
  }

  /// Relabel a row and persist whichever collection holds it
  pub async fn set_disposition(
    &self,
    id: &RowId,
    disposition: Disposition,
  ) -> Result<Option<TaskId>, PartitionError> {
    let _guard = self.in_flight.begin(Operation::Relabel(id.clone()))?;
    let _writer = self.writer.lock().await;

    let current = self.current().await;
    let (next, side) = current.with_disposition(id, disposition)?;
    tracing::info!(%id, %disposition, %side, "relabelling row");

    let task_id = match side {
      Side::Training => self.api.save_training(next.training()).await?.task_id,
      Side::HeldOut => {
        self.api.replace_held_out(next.held_out()).await?;
        None
      }
    };
    self.commit(next).await;
    Ok(task_id)
  }

  /// Delete a user row. Mission rows are refused without contacting the server.
  pub async fn remove_row(&self, id: &RowId) -> Result<(), PartitionError> {
    let _guard = self.in_flight.begin(Operation::Remove(id.clone()))?;
    let _writer = self.writer.lock().await;

    let current = self.current().await;
    let (_, row) =
      current.locate(id).ok_or_else(|| PartitionError::RowNotFound { id: id.clone(), side: None })?;
    if !row.is_removable() {
      return Err(PartitionError::NotRemovable { id: id.clone(), provenance: row.provenance });
    }

    let next = current.with_removed(id)?;
    tracing::info!(%id, "removing row");
    self.api.remove_row(id).await?;
    self.commit(next).await;
    Ok(())
  }

  /// Upload a user CSV; the returned dataset becomes the training mirror.
  /// Returns how many rows the partition gained.
  pub async fn upload_user_data(&self, file_name: &str, contents: Vec<u8>) -> Result<usize, PartitionError> {
    let _guard = self.in_flight.begin(Operation::Upload)?;
    let _writer = self.writer.lock().await;

    tracing::info!(file_name, bytes = contents.len(), "uploading user data");
    let rows = self.api.upload_user_data(file_name, contents).await?;

    let current = self.current().await;
    let (next, dropped) = current.with_training(rows);
    if !dropped.is_empty() {
      tracing::warn!(count = dropped.len(), ids = ?dropped, "uploaded rows already held out, kept held-out copies");
    }
    let added = next.len().saturating_sub(current.len());
    self.commit(next).await;
    Ok(added)
  }

  /// Re-save the training collection, usually to trigger an index rebuild
  pub async fn save_dataset(&self) -> Result<Option<TaskId>, PartitionError> {
    let _guard = self.in_flight.begin(Operation::Save)?;
    let _writer = self.writer.lock().await;

    let current = self.current().await;
    tracing::info!(rows = current.training().len(), "saving dataset");
    let saved = self.api.save_training(current.training()).await?;
    if let Some(message) = &saved.message {
      tracing::debug!(%message, "save response");
    }
    Ok(saved.task_id)
  }
}
