//! Data carried between the dashboard and the ML service

pub mod classification;
pub mod row;
pub mod task;

pub use classification::{ClassificationResult, SimilarExample};
pub use row::{Disposition, Features, Provenance, Row, RowId, ValidationError, FEATURE_FIELDS};
pub use task::{
  HealthStatus, RemoveRowRequest, SaveResponse, SplitRequest, SplitResponse, TaskId, TaskState,
  TaskStatus,
};
