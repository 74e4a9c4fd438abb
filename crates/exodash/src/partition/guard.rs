//! Rejects a second submission of an action that is still settling

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::model::RowId;

use super::PartitionError;

/// A remote-writing action, keyed per row where it targets one
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
  Reload,
  Split,
  Fold,
  Save,
  Upload,
  AddRow,
  Move(RowId),
  Relabel(RowId),
  Remove(RowId),
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Operation::Reload => f.write_str("reload"),
      Operation::Split => f.write_str("random split"),
      Operation::Fold => f.write_str("exit test mode"),
      Operation::Save => f.write_str("save dataset"),
      Operation::Upload => f.write_str("upload user data"),
      Operation::AddRow => f.write_str("add row"),
      Operation::Move(id) => write!(f, "move row {id}"),
      Operation::Relabel(id) => write!(f, "relabel row {id}"),
      Operation::Remove(id) => write!(f, "remove row {id}"),
    }
  }
}

#[derive(Clone, Default)]
pub(crate) struct InFlight {
  active: Arc<Mutex<HashSet<Operation>>>,
}

impl InFlight {
  /// Claim `operation` until the returned guard drops
  pub(crate) fn begin(&self, operation: Operation) -> Result<InFlightGuard, PartitionError> {
    let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
    if !active.insert(operation.clone()) {
      tracing::warn!(%operation, "rejected duplicate submission");
      return Err(PartitionError::InFlight { operation });
    }
    Ok(InFlightGuard { active: Arc::clone(&self.active), operation })
  }

  pub(crate) fn active(&self) -> Vec<Operation> {
    self.active.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
  }
}

pub(crate) struct InFlightGuard {
  active: Arc<Mutex<HashSet<Operation>>>,
  operation: Operation,
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    self.active.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.operation);
  }
}
