//! Pure partition values. Every mutation returns a new [`Partition`]; nothing
//! here talks to the network.

use std::collections::HashSet;
use std::fmt;

use crate::model::{Disposition, Row, RowId, ValidationError};

use super::PartitionError;

/// Which collection a row lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
  Training,
  HeldOut,
}

impl Side {
  pub fn other(&self) -> Side {
    match self {
      Side::Training => Side::HeldOut,
      Side::HeldOut => Side::Training,
    }
  }
}

impl fmt::Display for Side {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Side::Training => f.write_str("training"),
      Side::HeldOut => f.write_str("held-out"),
    }
  }
}

/// Default Mode retrieves over everything; Test Mode shows the held-out table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
  #[default]
  Default,
  Test,
}

/// Whether the mirrors reflect the server. Never inferred from row counts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
  #[default]
  NotLoaded,
  Loading,
  Loaded,
  Failed(String),
}

impl LoadState {
  pub fn is_loading(&self) -> bool {
    matches!(self, LoadState::Loading)
  }
}

/// Share of the dataset a random split moves to held-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HoldoutPercentage(u8);

impl HoldoutPercentage {
  pub const MIN: u8 = 5;
  pub const MAX: u8 = 50;

  pub fn new(value: u8) -> Result<Self, ValidationError> {
    if !(Self::MIN..=Self::MAX).contains(&value) {
      return Err(ValidationError::PercentageOutOfRange { value, min: Self::MIN, max: Self::MAX });
    }
    Ok(Self(value))
  }

  pub fn get(&self) -> u8 {
    self.0
  }
}

impl Default for HoldoutPercentage {
  fn default() -> Self {
    Self(20)
  }
}

impl fmt::Display for HoldoutPercentage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}%", self.0)
  }
}

/// Two disjoint row collections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
  training: Vec<Row>,
  held_out: Vec<Row>,
}

impl Partition {
  /// Build from what the server returned, repairing any overlap.
  ///
  /// A row listed in both collections stays in held-out; repeated ids within
  /// one collection keep their first occurrence. The dropped ids are returned.
  pub fn from_remote(training: Vec<Row>, held_out: Vec<Row>) -> (Self, Vec<RowId>) {
    let mut dropped = Vec::new();
    let mut seen = HashSet::new();

    let held_out: Vec<Row> = held_out
      .into_iter()
      .filter(|row| {
        let fresh = seen.insert(row.id.clone());
        if !fresh {
          dropped.push(row.id.clone());
        }
        fresh
      })
      .collect();

    let training: Vec<Row> = training
      .into_iter()
      .filter(|row| {
        let fresh = seen.insert(row.id.clone());
        if !fresh {
          dropped.push(row.id.clone());
        }
        fresh
      })
      .collect();

    (Self { training, held_out }, dropped)
  }

  pub fn training(&self) -> &[Row] {
    &self.training
  }

  pub fn held_out(&self) -> &[Row] {
    &self.held_out
  }

  pub fn side(&self, side: Side) -> &[Row] {
    match side {
      Side::Training => &self.training,
      Side::HeldOut => &self.held_out,
    }
  }

  /// Rows across both collections
  pub fn len(&self) -> usize {
    self.training.len() + self.held_out.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn locate(&self, id: &RowId) -> Option<(Side, &Row)> {
    if let Some(row) = self.training.iter().find(|r| &r.id == id) {
      return Some((Side::Training, row));
    }
    self.held_out.iter().find(|r| &r.id == id).map(|row| (Side::HeldOut, row))
  }

  /// No id appears twice across (or within) the collections
  pub fn is_disjoint(&self) -> bool {
    let mut seen = HashSet::with_capacity(self.len());
    self.training.iter().chain(&self.held_out).all(|row| seen.insert(&row.id))
  }

  /// Move `id` from `from` to the end of the other collection
  pub fn with_moved(&self, id: &RowId, from: Side) -> Result<Partition, PartitionError> {
    let position = self
      .side(from)
      .iter()
      .position(|r| &r.id == id)
      .ok_or_else(|| PartitionError::RowNotFound { id: id.clone(), side: Some(from) })?;

    let mut next = self.clone();
    let (source, target) = match from {
      Side::Training => (&mut next.training, &mut next.held_out),
      Side::HeldOut => (&mut next.held_out, &mut next.training),
    };
    let row = source.remove(position);
    target.push(row);
    Ok(next)
  }

  /// Append a new row to training
  pub fn with_appended(&self, row: Row) -> Result<Partition, PartitionError> {
    if self.locate(&row.id).is_some() {
      return Err(PartitionError::DuplicateRow { id: row.id });
    }
    let mut next = self.clone();
    next.training.push(row);
    Ok(next)
  }

  pub fn with_removed(&self, id: &RowId) -> Result<Partition, PartitionError> {
    let mut next = self.clone();
    let before = next.len();
    next.training.retain(|r| &r.id != id);
    next.held_out.retain(|r| &r.id != id);
    if next.len() == before {
      return Err(PartitionError::RowNotFound { id: id.clone(), side: None });
    }
    Ok(next)
  }

  /// Relabel a row wherever it lives; returns the collection that changed
  pub fn with_disposition(
    &self,
    id: &RowId,
    disposition: Disposition,
  ) -> Result<(Partition, Side), PartitionError> {
    let (side, _) =
      self.locate(id).ok_or_else(|| PartitionError::RowNotFound { id: id.clone(), side: None })?;
    let mut next = self.clone();
    let rows = match side {
      Side::Training => &mut next.training,
      Side::HeldOut => &mut next.held_out,
    };
    if let Some(row) = rows.iter_mut().find(|r| &r.id == id) {
      row.disposition = Some(disposition);
    }
    Ok((next, side))
  }

  /// Replace the training collection, keeping held-out rows where they are
  pub fn with_training(&self, training: Vec<Row>) -> (Partition, Vec<RowId>) {
    Partition::from_remote(training, self.held_out.clone())
  }

  /// Everything back in training, held-out empty
  pub fn folded(&self) -> Partition {
    let mut training = self.training.clone();
    training.extend(self.held_out.iter().cloned());
    Partition { training, held_out: Vec::new() }
  }
}
