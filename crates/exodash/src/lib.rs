//! Exodash: the training/held-out partition manager, classification client
//! and ML proxy behind the exoplanet dashboard.

pub mod classify;
pub mod cli;
pub mod client;
pub mod config;
pub mod loader;
pub mod model;
pub mod partition;
pub mod proxy;
pub mod table;
pub mod tasks;

pub use client::{ApiError, DatasetApi, HttpDatasetApi};
pub use partition::{HoldoutManager, PartitionError};
