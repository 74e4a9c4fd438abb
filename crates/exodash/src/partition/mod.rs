//! Training/held-out partition
//!
//! [`HoldoutManager`] owns the only copy of the two collections. View code
//! reads [`PartitionSnapshot`]s; every change goes through one of the
//! manager's operations, which commit locally only after the remote write
//! succeeds.

pub mod guard;
pub mod manager;
pub mod state;

use thiserror::Error;

use crate::client::ApiError;
use crate::model::{Provenance, RowId, ValidationError};

pub use guard::Operation;
pub use manager::{HoldoutManager, PartitionSnapshot, SplitOutcome};
pub use state::{HoldoutPercentage, LoadState, Mode, Partition, Side};

#[derive(Debug, Error)]
pub enum PartitionError {
  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error("{operation} is already in progress")]
  InFlight { operation: Operation },

  #[error("Row {id} not found{}", .side.as_ref().map(|s| format!(" in {s} data")).unwrap_or_default())]
  RowNotFound { id: RowId, side: Option<Side> },

  #[error("Row {id} already exists")]
  DuplicateRow { id: RowId },

  #[error("Row {id} cannot be removed: only user rows are removable ({provenance} data)")]
  NotRemovable { id: RowId, provenance: Provenance },

  #[error(transparent)]
  Remote(#[from] ApiError),

  #[error("Local and server data have diverged ({cause}; restoring failed: {compensation}). Reload to resync.")]
  Diverged { cause: ApiError, compensation: ApiError },

  #[error("Server changed but reloading failed: {source}. Reload to resync.")]
  Stale { source: ApiError },
}

impl PartitionError {
  /// The underlying remote failure, if any
  pub fn api_error(&self) -> Option<&ApiError> {
    match self {
      PartitionError::Remote(e) | PartitionError::Stale { source: e } => Some(e),
      PartitionError::Diverged { cause, .. } => Some(cause),
      _ => None,
    }
  }

  /// Retrying the same action may succeed
  pub fn is_retryable(&self) -> bool {
    match self {
      PartitionError::Remote(e) => e.is_retryable(),
      PartitionError::InFlight { .. } => true,
      _ => false,
    }
  }

  /// Local mirrors can no longer be trusted until reloaded
  pub fn needs_reload(&self) -> bool {
    matches!(self, PartitionError::Diverged { .. } | PartitionError::Stale { .. })
  }
}
