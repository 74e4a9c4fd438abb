//! Responses from the prediction endpoint

use serde::{Deserialize, Serialize};

use super::row::{lenient_disposition, lenient_f64, Disposition};

/// A retrieved neighbour the classifier showed the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarExample {
  #[serde(default)]
  pub id: Option<serde_json::Value>,

  #[serde(default)]
  pub name: Option<String>,

  #[serde(default, deserialize_with = "lenient_disposition")]
  pub disposition: Option<Disposition>,

  #[serde(default, deserialize_with = "lenient_f64")]
  pub period: Option<f64>,

  #[serde(default, deserialize_with = "lenient_f64")]
  pub duration: Option<f64>,

  #[serde(default, deserialize_with = "lenient_f64")]
  pub depth: Option<f64>,

  #[serde(default, deserialize_with = "lenient_f64")]
  pub prad: Option<f64>,

  #[serde(default, deserialize_with = "lenient_f64")]
  pub teq: Option<f64>,

  #[serde(default, deserialize_with = "lenient_f64")]
  pub distance: Option<f64>,
}

/// Outcome of one classification request. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
  pub prediction: Disposition,
  pub confidence: f64,
  pub model: String,

  #[serde(default)]
  pub similar_examples_used: u32,

  #[serde(default)]
  pub processing_time: String,

  #[serde(default)]
  pub similar_examples: Vec<SimilarExample>,
}

impl ClassificationResult {
  /// Reject results whose confidence is not a probability
  pub fn check(&self) -> Result<(), String> {
    if !(0.0..=1.0).contains(&self.confidence) {
      return Err(format!("confidence {} is outside [0, 1]", self.confidence));
    }
    Ok(())
  }

  /// How many retrieved neighbours agree with the prediction
  pub fn agreeing_examples(&self) -> usize {
    self.similar_examples.iter().filter(|e| e.disposition == Some(self.prediction)).count()
  }
}
