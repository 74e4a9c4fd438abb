//! CSV loading: the mission catalogs and the unified dataset file
//!
//! Mission catalogs are the NASA archive exports. They are mapped by column
//! position, not header name, because the three exports name the same
//! quantity differently.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::model::{Disposition, Provenance, Row, RowId};

#[derive(Debug, Error)]
pub enum LoaderError {
  #[error("Failed to open {path}: {source}")]
  Open { path: PathBuf, source: io::Error },

  #[error("Malformed CSV: {0}")]
  Csv(#[from] csv::Error),

  #[error("Dataset CSV has no '{column}' column")]
  MissingColumn { column: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mission {
  Koi,
  K2,
  Tess,
}

impl Mission {
  pub fn file_name(&self) -> &'static str {
    match self {
      Mission::Koi => "koi_data_full.csv",
      Mission::K2 => "k2_data_full.csv",
      Mission::Tess => "toi_data_full.csv",
    }
  }

  pub fn provenance(&self) -> Provenance {
    match self {
      Mission::Koi => Provenance::Koi,
      Mission::K2 => Provenance::K2,
      Mission::Tess => Provenance::Toi,
    }
  }

  fn layout(&self) -> &'static Layout {
    match self {
      Mission::Koi => &KOI,
      Mission::K2 => &K2,
      Mission::Tess => &TESS,
    }
  }
}

/// Column positions in one mission export
struct Layout {
  id: usize,
  id_fallback: Option<usize>,
  name: Option<usize>,
  status: usize,
  discovered: Discovered,
  period: usize,
  prad: usize,
  teq: usize,
  steff: usize,
  srad: usize,
}

enum Discovered {
  Fixed(&'static str),
  Year(usize),
  Timestamp(usize),
}

const KOI: Layout = Layout {
  id: 1,
  id_fallback: None,
  name: Some(2),
  status: 3,
  discovered: Discovered::Fixed("2009-2018"),
  period: 10,
  prad: 26,
  teq: 29,
  steff: 37,
  srad: 40,
};

const K2: Layout = Layout {
  id: 4,
  id_fallback: Some(1),
  name: Some(1),
  status: 12,
  discovered: Discovered::Year(19),
  period: 41,
  prad: 43,
  teq: 55,
  steff: 74,
  srad: 76,
};

// TESS has no planet name; the TIC id stands in
const TESS: Layout = Layout {
  id: 1,
  id_fallback: None,
  name: Some(3),
  status: 6,
  discovered: Discovered::Timestamp(25),
  period: 14,
  prad: 17,
  teq: 19,
  steff: 22,
  srad: 24,
};

/// One row of a mission catalog, values rounded for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
  pub mission: Mission,
  pub planet_id: String,
  pub name: Option<String>,
  pub discovered: Option<String>,
  pub status: Option<String>,
  pub orbital_period: Option<f64>,
  pub planet_radius: Option<f64>,
  pub equilibrium_temp: Option<f64>,
  pub stellar_temp: Option<f64>,
  pub stellar_radius: Option<f64>,
}

fn csv_reader<R: io::Read>(reader: R) -> csv::Reader<R> {
  csv::ReaderBuilder::new()
    .has_headers(true)
    .flexible(true)
    .comment(Some(b'#'))
    .trim(csv::Trim::All)
    .from_reader(reader)
}

fn open(path: &Path) -> Result<File, LoaderError> {
  File::open(path).map_err(|source| LoaderError::Open { path: path.to_path_buf(), source })
}

fn round_to(value: f64, places: i32) -> f64 {
  let scale = 10f64.powi(places);
  (value * scale).round() / scale
}

fn text(record: &csv::StringRecord, index: usize) -> Option<&str> {
  record.get(index).filter(|v| !v.is_empty())
}

fn number(record: &csv::StringRecord, index: usize, places: i32) -> Option<f64> {
  text(record, index)?.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| round_to(v, places))
}

pub fn load_catalog(mission: Mission, path: &Path) -> Result<Vec<CatalogEntry>, LoaderError> {
  let entries = parse_catalog(mission, open(path)?)?;
  tracing::debug!(?mission, path = %path.display(), entries = entries.len(), "loaded catalog");
  Ok(entries)
}

/// Rows without an identifier are dropped
pub fn parse_catalog<R: io::Read>(mission: Mission, reader: R) -> Result<Vec<CatalogEntry>, LoaderError> {
  let layout = mission.layout();
  let mut entries = Vec::new();

  for record in csv_reader(reader).records() {
    let record = record?;
    let id = text(&record, layout.id).or_else(|| layout.id_fallback.and_then(|i| text(&record, i)));
    let Some(planet_id) = id else {
      continue;
    };

    let discovered = match layout.discovered {
      Discovered::Fixed(range) => Some(range.to_string()),
      Discovered::Year(i) => text(&record, i).map(str::to_string),
      Discovered::Timestamp(i) => text(&record, i).and_then(|t| t.split_whitespace().next()).map(str::to_string),
    };

    entries.push(CatalogEntry {
      mission,
      planet_id: planet_id.to_string(),
      name: layout.name.and_then(|i| text(&record, i)).map(str::to_string),
      discovered,
      status: text(&record, layout.status).map(str::to_string),
      orbital_period: number(&record, layout.period, 2),
      planet_radius: number(&record, layout.prad, 2),
      equilibrium_temp: number(&record, layout.teq, 0),
      stellar_temp: number(&record, layout.steff, 0),
      stellar_radius: number(&record, layout.srad, 2),
    });
  }

  Ok(entries)
}

pub fn load_dataset(path: &Path) -> Result<Vec<Row>, LoaderError> {
  parse_dataset(open(path)?)
}

/// Parse the unified `type,id,name,disposition,period,duration,depth,prad,teq`
/// file. Columns are matched by header name; rows with no id or an unknown
/// type are skipped.
pub fn parse_dataset<R: io::Read>(reader: R) -> Result<Vec<Row>, LoaderError> {
  let mut reader = csv_reader(reader);
  let headers = reader.headers()?.clone();
  let column = |name: &'static str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
  let require = |name: &'static str| column(name).ok_or(LoaderError::MissingColumn { column: name });

  let type_col = require("type")?;
  let id_col = require("id")?;
  let name_col = column("name");
  let disposition_col = column("disposition");
  let feature_cols = ["period", "duration", "depth", "prad", "teq"].map(column);

  let mut rows = Vec::new();
  let mut skipped = 0usize;
  for record in reader.records() {
    let record = record?;
    let Some(id) = text(&record, id_col) else {
      skipped += 1;
      continue;
    };
    let Some(provenance) = text(&record, type_col).and_then(|t| t.parse::<Provenance>().ok()) else {
      skipped += 1;
      continue;
    };

    let feature = |i: usize| {
      feature_cols[i].and_then(|c| text(&record, c)).and_then(|v| v.parse::<f64>().ok()).filter(|v| v.is_finite())
    };
    rows.push(Row {
      provenance,
      id: RowId::new(id),
      name: name_col.and_then(|c| text(&record, c)).map(str::to_string),
      disposition: disposition_col.and_then(|c| text(&record, c)).and_then(Disposition::parse),
      raw_disposition: None,
      period: feature(0),
      duration: feature(1),
      depth: feature(2),
      prad: feature(3),
      teq: feature(4),
    });
  }

  if skipped > 0 {
    tracing::warn!(skipped, "dataset rows without id or known type were skipped");
  }
  Ok(rows)
}
