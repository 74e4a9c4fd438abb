//! Labeled exoplanet observations as the ML service stores them.
//!
//! The service writes its collections from pandas, so ids arrive as numbers or
//! strings, features may be `null`, and dispositions come either as labels or
//! as `1`/`0`. Everything is normalized here on the way in.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Names of the five numeric inputs the classifier requires, in form order
pub const FEATURE_FIELDS: [&str; 5] = ["period", "duration", "depth", "prad", "teq"];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
  #[error("Please fill in all fields! Missing: {field}")]
  MissingField { field: &'static str },

  #[error("'{value}' is not a valid number for {field}")]
  InvalidNumber { field: &'static str, value: String },

  #[error("hold-out percentage must be between {min} and {max}, got {value}")]
  PercentageOutOfRange { value: u8, min: u8, max: u8 },
}

/// Stable identity of a row across both collections.
///
/// Compared by its text. An id that arrived as a JSON number is written back
/// as the same number.
#[derive(Debug, Clone)]
pub struct RowId {
  text: String,
  number: Option<serde_json::Number>,
}

impl RowId {
  pub fn new(id: impl Into<String>) -> Self {
    Self { text: id.into(), number: None }
  }

  fn numeric(number: serde_json::Number, text: String) -> Self {
    Self { text, number: Some(number) }
  }

  pub fn as_str(&self) -> &str {
    &self.text
  }
}

impl PartialEq for RowId {
  fn eq(&self, other: &Self) -> bool {
    self.text == other.text
  }
}

impl Eq for RowId {}

impl std::hash::Hash for RowId {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.text.hash(state);
  }
}

impl PartialOrd for RowId {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for RowId {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.text.cmp(&other.text)
  }
}

impl fmt::Display for RowId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.text)
  }
}

impl From<&str> for RowId {
  fn from(id: &str) -> Self {
    Self::new(id)
  }
}

impl From<String> for RowId {
  fn from(id: String) -> Self {
    Self::new(id)
  }
}

impl Serialize for RowId {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match &self.number {
      Some(number) => number.serialize(serializer),
      None => serializer.serialize_str(&self.text),
    }
  }
}

impl<'de> Deserialize<'de> for RowId {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct RowIdVisitor;

    impl Visitor<'_> for RowIdVisitor {
      type Value = RowId;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or numeric row id")
      }

      fn visit_str<E: de::Error>(self, v: &str) -> Result<RowId, E> {
        if v.trim().is_empty() {
          return Err(E::custom("row id must not be empty"));
        }
        Ok(RowId::new(v.trim()))
      }

      fn visit_u64<E: de::Error>(self, v: u64) -> Result<RowId, E> {
        Ok(RowId::numeric(v.into(), v.to_string()))
      }

      fn visit_i64<E: de::Error>(self, v: i64) -> Result<RowId, E> {
        Ok(RowId::numeric(v.into(), v.to_string()))
      }

      fn visit_f64<E: de::Error>(self, v: f64) -> Result<RowId, E> {
        let text = if v.fract() == 0.0 && v.is_finite() { format!("{v:.0}") } else { v.to_string() };
        match serde_json::Number::from_f64(v) {
          Some(number) => Ok(RowId::numeric(number, text)),
          None => Err(E::custom("row id must be a finite number")),
        }
      }
    }

    deserializer.deserialize_any(RowIdVisitor)
  }
}

/// Where a row came from. Drives display names and what a user may do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
  Koi,
  Toi,
  K2,
  User,
}

impl Provenance {
  pub const ALL: [Provenance; 4] = [Provenance::Koi, Provenance::Toi, Provenance::K2, Provenance::User];

  /// Telescope/mission label shown in tables
  pub fn mission_name(&self) -> &'static str {
    match self {
      Provenance::Koi => "Kepler",
      Provenance::Toi => "TESS",
      Provenance::K2 => "K2",
      Provenance::User => "User",
    }
  }

  pub fn code(&self) -> &'static str {
    match self {
      Provenance::Koi => "koi",
      Provenance::Toi => "toi",
      Provenance::K2 => "k2",
      Provenance::User => "user",
    }
  }

  /// Only rows a user submitted may be deleted
  pub fn is_removable(&self) -> bool {
    matches!(self, Provenance::User)
  }
}

impl std::str::FromStr for Provenance {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "koi" | "kepler" => Ok(Provenance::Koi),
      "toi" | "tess" => Ok(Provenance::Toi),
      "k2" => Ok(Provenance::K2),
      "user" => Ok(Provenance::User),
      other => Err(format!("unknown row type '{other}' (expected koi, toi, k2 or user)")),
    }
  }
}

impl fmt::Display for Provenance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.code())
  }
}

/// Ground-truth or predicted label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Disposition {
  Candidate,
  FalsePositive,
}

impl Disposition {
  pub fn label(&self) -> &'static str {
    match self {
      Disposition::Candidate => "CANDIDATE",
      Disposition::FalsePositive => "FALSE POSITIVE",
    }
  }

  /// Parse a label or the numeric encoding. Unrecognized values give `None`.
  pub fn parse(value: &str) -> Option<Self> {
    match value.trim().to_ascii_uppercase().replace('_', " ").as_str() {
      "CANDIDATE" | "CONFIRMED" | "1" | "1.0" => Some(Disposition::Candidate),
      "FALSE POSITIVE" | "0" | "0.0" => Some(Disposition::FalsePositive),
      _ => None,
    }
  }
}

impl fmt::Display for Disposition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

impl std::str::FromStr for Disposition {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Disposition::parse(s).ok_or_else(|| format!("unknown disposition '{s}'"))
  }
}

impl Serialize for Disposition {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.label())
  }
}

impl<'de> Deserialize<'de> for Disposition {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    lenient_disposition(deserializer)?
      .ok_or_else(|| de::Error::custom("expected CANDIDATE or FALSE POSITIVE"))
  }
}

/// Accepts labels, `1`/`0`, `true`/`false` and `null`
pub(crate) fn lenient_disposition<'de, D: Deserializer<'de>>(
  deserializer: D,
) -> Result<Option<Disposition>, D::Error> {
  struct DispositionVisitor;

  impl<'de> Visitor<'de> for DispositionVisitor {
    type Value = Option<Disposition>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
      f.write_str("a disposition label or 1/0")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
      Ok(Disposition::parse(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
      Ok(match v {
        1 => Some(Disposition::Candidate),
        0 => Some(Disposition::FalsePositive),
        _ => None,
      })
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
      Ok(match v {
        1 => Some(Disposition::Candidate),
        0 => Some(Disposition::FalsePositive),
        _ => None,
      })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
      Ok(if v == 1.0 {
        Some(Disposition::Candidate)
      } else if v == 0.0 {
        Some(Disposition::FalsePositive)
      } else {
        None
      })
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
      Ok(Some(if v { Disposition::Candidate } else { Disposition::FalsePositive }))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
      Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
      Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
      d.deserialize_any(self)
    }
  }

  deserializer.deserialize_any(DispositionVisitor)
}

/// Numbers, numeric strings, blanks and `null`
pub(crate) fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
  struct NumberVisitor;

  impl<'de> Visitor<'de> for NumberVisitor {
    type Value = Option<f64>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
      f.write_str("a number, numeric string or null")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
      Ok(v.is_finite().then_some(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
      Ok(Some(v as f64))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
      Ok(Some(v as f64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
      let v = v.trim();
      if v.is_empty() || v.eq_ignore_ascii_case("nan") {
        return Ok(None);
      }
      v.parse::<f64>().map(|n| n.is_finite().then_some(n)).map_err(E::custom)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
      Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
      Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
      d.deserialize_any(self)
    }
  }

  deserializer.deserialize_any(NumberVisitor)
}

/// The five classifier inputs, all present
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Features {
  pub period: f64,
  pub duration: f64,
  pub depth: f64,
  pub prad: f64,
  pub teq: f64,
}

impl Features {
  pub fn values(&self) -> [f64; 5] {
    [self.period, self.duration, self.depth, self.prad, self.teq]
  }
}

/// One labeled exoplanet observation.
///
/// Rows written back to the service keep the wire form they arrived in: a
/// numeric id stays a number and an unchanged label is echoed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireRow", into = "WireRow")]
pub struct Row {
  pub provenance: Provenance,
  pub id: RowId,
  pub name: Option<String>,
  pub disposition: Option<Disposition>,

  /// Label exactly as the service sent it, `None` for rows built locally
  pub raw_disposition: Option<serde_json::Value>,

  pub period: Option<f64>,
  pub duration: Option<f64>,
  pub depth: Option<f64>,
  pub prad: Option<f64>,
  pub teq: Option<f64>,
}

#[derive(Serialize, Deserialize)]
struct WireRow {
  #[serde(rename = "type")]
  provenance: Provenance,

  id: RowId,

  #[serde(default)]
  name: Option<String>,

  #[serde(default)]
  disposition: serde_json::Value,

  #[serde(default, deserialize_with = "lenient_f64")]
  period: Option<f64>,

  #[serde(default, deserialize_with = "lenient_f64")]
  duration: Option<f64>,

  #[serde(default, deserialize_with = "lenient_f64")]
  depth: Option<f64>,

  #[serde(default, deserialize_with = "lenient_f64")]
  prad: Option<f64>,

  #[serde(default, deserialize_with = "lenient_f64")]
  teq: Option<f64>,
}

impl From<WireRow> for Row {
  fn from(wire: WireRow) -> Self {
    let disposition = lenient_disposition(&wire.disposition).ok().flatten();
    Row {
      provenance: wire.provenance,
      id: wire.id,
      name: wire.name,
      disposition,
      raw_disposition: Some(wire.disposition),
      period: wire.period,
      duration: wire.duration,
      depth: wire.depth,
      prad: wire.prad,
      teq: wire.teq,
    }
  }
}

impl From<Row> for WireRow {
  fn from(row: Row) -> Self {
    WireRow {
      disposition: wire_disposition(row.disposition, row.raw_disposition),
      provenance: row.provenance,
      id: row.id,
      name: row.name,
      period: row.period,
      duration: row.duration,
      depth: row.depth,
      prad: row.prad,
      teq: row.teq,
    }
  }
}

/// The received label while it still means `current`, otherwise `current` in
/// the encoding the service used for this row. Local rows get labels.
fn wire_disposition(current: Option<Disposition>, raw: Option<serde_json::Value>) -> serde_json::Value {
  use serde_json::Value;

  let Some(raw) = raw else {
    return current.map_or(Value::Null, |d| Value::from(d.label()));
  };
  if lenient_disposition(&raw).ok().flatten() == current {
    return raw;
  }
  match (current, raw) {
    (None, _) => Value::Null,
    (Some(d), Value::String(_)) => Value::from(d.label()),
    (Some(Disposition::Candidate), _) => Value::from(1),
    (Some(Disposition::FalsePositive), _) => Value::from(0),
  }
}

impl Row {
  /// A row submitted by hand, with a synthetic id and name
  pub fn user_submitted(features: Features, disposition: Disposition, ordinal: usize) -> Self {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    Self {
      provenance: Provenance::User,
      id: RowId::new(format!("user-{}", &suffix[..8])),
      name: Some(format!("User Planet {ordinal}")),
      disposition: Some(disposition),
      raw_disposition: None,
      period: Some(features.period),
      duration: Some(features.duration),
      depth: Some(features.depth),
      prad: Some(features.prad),
      teq: Some(features.teq),
    }
  }

  pub fn is_removable(&self) -> bool {
    self.provenance.is_removable()
  }

  /// Display name, falling back to the id
  pub fn display_name(&self) -> &str {
    self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(self.id.as_str())
  }

  /// Raw feature values in [`FEATURE_FIELDS`] order
  pub fn feature_values(&self) -> [Option<f64>; 5] {
    [self.period, self.duration, self.depth, self.prad, self.teq]
  }

  /// All five features, or the first one that is missing
  pub fn features(&self) -> Result<Features, ValidationError> {
    let values = self.feature_values();
    for (field, value) in FEATURE_FIELDS.into_iter().zip(values) {
      if value.is_none() {
        return Err(ValidationError::MissingField { field });
      }
    }
    let [period, duration, depth, prad, teq] = values.map(|v| v.unwrap_or_default());
    Ok(Features { period, duration, depth, prad, teq })
  }
}
