//! Classification form and session
//!
//! The form holds raw text exactly as typed. Nothing is sent until all five
//! fields parse, so a half-filled form never costs a network round trip.

use std::sync::Arc;
use thiserror::Error;

use crate::client::{ApiError, DatasetApi};
use crate::model::{ClassificationResult, Features, Row, ValidationError, FEATURE_FIELDS};

#[derive(Debug, Error)]
pub enum ClassifyError {
  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error("Classification failed: {0}")]
  Remote(#[from] ApiError),
}

/// Sample inputs from the three missions, for quick testing
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
  Kepler,
  Tess,
  K2,
}

impl Preset {
  pub fn form(&self) -> ClassificationForm {
    let [period, duration, depth, prad, teq] = match self {
      Preset::Kepler => ["9.49", "2.96", "615.8", "2.26", "793"],
      Preset::Tess => ["3.12", "2.02", "656.9", "5.82", "3127"],
      Preset::K2 => ["7.78", "3.18", "1320.0", "4.19", "1050"],
    };
    ClassificationForm {
      period: period.into(),
      duration: duration.into(),
      depth: depth.into(),
      prad: prad.into(),
      teq: teq.into(),
    }
  }
}

/// The five inputs as entered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationForm {
  pub period: String,
  pub duration: String,
  pub depth: String,
  pub prad: String,
  pub teq: String,
}

impl ClassificationForm {
  /// Copy a row's features; missing values become empty fields
  pub fn from_row(row: &Row) -> Self {
    let [period, duration, depth, prad, teq] =
      row.feature_values().map(|v| v.map(|n| n.to_string()).unwrap_or_default());
    Self { period, duration, depth, prad, teq }
  }

  pub fn from_features(features: &Features) -> Self {
    let [period, duration, depth, prad, teq] = features.values().map(|n| n.to_string());
    Self { period, duration, depth, prad, teq }
  }

  pub fn fields(&self) -> [&str; 5] {
    [&self.period, &self.duration, &self.depth, &self.prad, &self.teq]
  }

  pub fn is_blank(&self) -> bool {
    self.fields().iter().all(|f| f.trim().is_empty())
  }

  /// Parse all five fields, reporting the first blank or unparsable one
  pub fn validate(&self) -> Result<Features, ValidationError> {
    let mut values = [0.0f64; 5];
    for ((field, raw), slot) in FEATURE_FIELDS.into_iter().zip(self.fields()).zip(values.iter_mut()) {
      let raw = raw.trim();
      if raw.is_empty() {
        return Err(ValidationError::MissingField { field });
      }
      *slot = raw
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::InvalidNumber { field, value: raw.to_string() })?;
    }
    let [period, duration, depth, prad, teq] = values;
    Ok(Features { period, duration, depth, prad, teq })
  }
}

/// Form state plus the last result, discarded whenever the inputs change
pub struct ClassificationSession {
  api: Arc<dyn DatasetApi>,
  form: ClassificationForm,
  result: Option<ClassificationResult>,
}

impl ClassificationSession {
  pub fn new(api: Arc<dyn DatasetApi>) -> Self {
    Self { api, form: ClassificationForm::default(), result: None }
  }

  pub fn form(&self) -> &ClassificationForm {
    &self.form
  }

  pub fn result(&self) -> Option<&ClassificationResult> {
    self.result.as_ref()
  }

  /// Replace the inputs (e.g. a held-out row under test) and clear the result
  pub fn load(&mut self, form: ClassificationForm) {
    self.form = form;
    self.result = None;
  }

  pub fn load_preset(&mut self, preset: Preset) {
    self.load(preset.form());
  }

  pub fn reset(&mut self) {
    self.load(ClassificationForm::default());
  }

  /// Validate, then ask the service. The previous result is dropped either way.
  pub async fn classify(&mut self) -> Result<&ClassificationResult, ClassifyError> {
    self.result = None;
    let features = self.form.validate()?;

    tracing::info!(?features, "classifying");
    let result = self.api.predict(&features).await?;
    tracing::info!(prediction = %result.prediction, confidence = result.confidence, "classified");
    Ok(self.result.insert(result))
  }
}
