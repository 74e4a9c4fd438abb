//! Paging, sorting and filtering over rows already in memory

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::loader::CatalogEntry;
use crate::model::{Disposition, Provenance, Row};

pub const ROWS_PER_PAGE: usize = 50;

/// A sortable cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
  Number(f64),
  Text(&'a str),
  Missing,
}

impl Cell<'_> {
  fn from_text(value: Option<&str>) -> Cell<'_> {
    match value {
      Some(v) if !v.is_empty() => Cell::Text(v),
      _ => Cell::Missing,
    }
  }

  fn from_number(value: Option<f64>) -> Cell<'static> {
    value.map(Cell::Number).unwrap_or(Cell::Missing)
  }

  /// Numbers before text; missing handled by the caller
  fn compare(&self, other: &Cell<'_>) -> Ordering {
    match (self, other) {
      (Cell::Number(a), Cell::Number(b)) => a.total_cmp(b),
      (Cell::Text(a), Cell::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
      (Cell::Number(_), Cell::Text(_)) => Ordering::Less,
      (Cell::Text(_), Cell::Number(_)) => Ordering::Greater,
      _ => Ordering::Equal,
    }
  }
}

/// Anything a table can show
pub trait Tabular {
  const COLUMNS: &'static [&'static str];

  fn cell(&self, column: &str) -> Cell<'_>;
  fn provenance(&self) -> Provenance;
  fn disposition(&self) -> Option<Disposition>;
  fn search_fields(&self) -> Vec<&str>;
}

impl Tabular for Row {
  const COLUMNS: &'static [&'static str] =
    &["type", "id", "name", "disposition", "period", "duration", "depth", "prad", "teq"];

  fn cell(&self, column: &str) -> Cell<'_> {
    match column {
      "type" => Cell::Text(self.provenance.mission_name()),
      "id" => match self.id.as_str().parse::<f64>() {
        Ok(n) => Cell::Number(n),
        Err(_) => Cell::Text(self.id.as_str()),
      },
      "name" => Cell::from_text(self.name.as_deref()),
      "disposition" => Cell::from_text(self.disposition.map(|d| d.label())),
      "period" => Cell::from_number(self.period),
      "duration" => Cell::from_number(self.duration),
      "depth" => Cell::from_number(self.depth),
      "prad" => Cell::from_number(self.prad),
      "teq" => Cell::from_number(self.teq),
      _ => Cell::Missing,
    }
  }

  fn provenance(&self) -> Provenance {
    self.provenance
  }

  fn disposition(&self) -> Option<Disposition> {
    self.disposition
  }

  fn search_fields(&self) -> Vec<&str> {
    let mut fields = vec![self.id.as_str()];
    fields.extend(self.name.as_deref());
    fields
  }
}

impl Tabular for CatalogEntry {
  const COLUMNS: &'static [&'static str] = &[
    "planet_id",
    "name",
    "discovered",
    "status",
    "period",
    "prad",
    "teq",
    "steff",
    "srad",
  ];

  fn cell(&self, column: &str) -> Cell<'_> {
    match column {
      "planet_id" => Cell::Text(&self.planet_id),
      "name" => Cell::from_text(self.name.as_deref()),
      "discovered" => Cell::from_text(self.discovered.as_deref()),
      "status" => Cell::from_text(self.status.as_deref()),
      "period" => Cell::from_number(self.orbital_period),
      "prad" => Cell::from_number(self.planet_radius),
      "teq" => Cell::from_number(self.equilibrium_temp),
      "steff" => Cell::from_number(self.stellar_temp),
      "srad" => Cell::from_number(self.stellar_radius),
      _ => Cell::Missing,
    }
  }

  fn provenance(&self) -> Provenance {
    self.mission.provenance()
  }

  fn disposition(&self) -> Option<Disposition> {
    self.status.as_deref().and_then(Disposition::parse)
  }

  fn search_fields(&self) -> Vec<&str> {
    let mut fields = vec![self.planet_id.as_str()];
    fields.extend(self.name.as_deref());
    fields
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Ascending,
  Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
  pub column: String,
  pub direction: Direction,
}

/// Empty sets and `None` match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
  pub provenances: BTreeSet<Provenance>,
  pub disposition: Option<Disposition>,
  pub search: Option<String>,
}

impl TableFilter {
  pub fn matches<T: Tabular>(&self, item: &T) -> bool {
    if !self.provenances.is_empty() && !self.provenances.contains(&item.provenance()) {
      return false;
    }
    if let Some(wanted) = self.disposition {
      if item.disposition() != Some(wanted) {
        return false;
      }
    }
    match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
      Some(needle) => {
        let needle = needle.to_lowercase();
        item.search_fields().iter().any(|f| f.to_lowercase().contains(&needle))
      }
      None => true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
  /// 1-based; clamped when applied
  pub page: usize,
  pub rows_per_page: usize,
  pub sort: Option<SortSpec>,
  pub filter: TableFilter,
}

impl Default for TableQuery {
  fn default() -> Self {
    Self { page: 1, rows_per_page: ROWS_PER_PAGE, sort: None, filter: TableFilter::default() }
  }
}

impl TableQuery {
  /// Sort by `column`, flipping direction when it is already the sort
  /// column. Always returns to the first page.
  pub fn sort_by(&mut self, column: &str) {
    let direction = match &self.sort {
      Some(s) if s.column == column && s.direction == Direction::Ascending => Direction::Descending,
      _ => Direction::Ascending,
    };
    self.sort = Some(SortSpec { column: column.to_string(), direction });
    self.page = 1;
  }

  pub fn set_filter(&mut self, filter: TableFilter) {
    self.filter = filter;
    self.page = 1;
  }

  pub fn apply<'a, T: Tabular>(&self, items: &'a [T]) -> TablePage<'a, T> {
    let mut selected: Vec<&T> = items.iter().filter(|item| self.filter.matches(*item)).collect();

    if let Some(sort) = &self.sort {
      selected.sort_by(|a, b| {
        let (a, b) = (a.cell(&sort.column), b.cell(&sort.column));
        match (a, b) {
          (Cell::Missing, Cell::Missing) => Ordering::Equal,
          (Cell::Missing, _) => Ordering::Greater,
          (_, Cell::Missing) => Ordering::Less,
          _ => match sort.direction {
            Direction::Ascending => a.compare(&b),
            Direction::Descending => b.compare(&a),
          },
        }
      });
    }

    let per_page = self.rows_per_page.max(1);
    let total_rows = selected.len();
    let total_pages = total_rows.div_ceil(per_page).max(1);
    let page = self.page.clamp(1, total_pages);
    let start = (page - 1) * per_page;
    let rows = selected.into_iter().skip(start).take(per_page).collect();

    TablePage { rows, page, total_pages, total_rows, first_index: start }
  }
}

#[derive(Debug)]
pub struct TablePage<'a, T> {
  pub rows: Vec<&'a T>,
  pub page: usize,
  pub total_pages: usize,
  /// Rows matching the filter, across all pages
  pub total_rows: usize,
  pub first_index: usize,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::RowId;

  fn row(id: &str, provenance: Provenance, period: Option<f64>) -> Row {
    Row {
      provenance,
      id: RowId::new(id),
      name: Some(format!("Planet {id}")),
      disposition: Some(if period.is_some() { Disposition::Candidate } else { Disposition::FalsePositive }),
      raw_disposition: None,
      period,
      duration: None,
      depth: None,
      prad: None,
      teq: None,
    }
  }

  fn ids<'a>(page: &TablePage<'a, Row>) -> Vec<&'a str> {
    page.rows.iter().map(|r| r.id.as_str()).collect()
  }

  #[test]
  fn pages_are_clamped() {
    let rows: Vec<Row> = (0..120).map(|i| row(&i.to_string(), Provenance::Koi, Some(1.0))).collect();
    let mut query = TableQuery::default();

    let page = query.apply(&rows);
    assert_eq!((page.page, page.total_pages, page.rows.len()), (1, 3, 50));

    query.page = 99;
    let page = query.apply(&rows);
    assert_eq!((page.page, page.rows.len(), page.first_index), (3, 20, 100));

    query.page = 0;
    assert_eq!(query.apply(&rows).page, 1);

    let empty: Vec<Row> = Vec::new();
    let page = query.apply(&empty);
    assert_eq!((page.page, page.total_pages, page.total_rows), (1, 1, 0));
  }

  #[test]
  fn sort_toggles_and_keeps_missing_last() {
    let rows = vec![
      row("1", Provenance::Koi, Some(3.0)),
      row("2", Provenance::Koi, None),
      row("3", Provenance::Koi, Some(1.0)),
      row("10", Provenance::Koi, Some(2.0)),
    ];
    let mut query = TableQuery { page: 2, ..Default::default() };

    query.sort_by("period");
    assert_eq!(query.page, 1);
    assert_eq!(ids(&query.apply(&rows)), vec!["3", "10", "1", "2"]);

    query.sort_by("period");
    assert_eq!(query.sort.as_ref().map(|s| s.direction), Some(Direction::Descending));
    assert_eq!(ids(&query.apply(&rows)), vec!["1", "10", "3", "2"]);

    // numeric ids sort numerically
    query.sort_by("id");
    assert_eq!(ids(&query.apply(&rows)), vec!["1", "2", "3", "10"]);
  }

  #[test]
  fn filters_combine() {
    let rows = vec![
      row("1", Provenance::Koi, Some(3.0)),
      row("2", Provenance::Toi, None),
      row("user-abc", Provenance::User, Some(1.0)),
    ];
    let mut query = TableQuery::default();

    query.set_filter(TableFilter {
      provenances: [Provenance::Koi, Provenance::User].into_iter().collect(),
      disposition: Some(Disposition::Candidate),
      search: None,
    });
    assert_eq!(ids(&query.apply(&rows)), vec!["1", "user-abc"]);

    query.set_filter(TableFilter { search: Some("  USER ".into()), ..Default::default() });
    assert_eq!(ids(&query.apply(&rows)), vec!["user-abc"]);

    query.set_filter(TableFilter { search: Some("planet 2".into()), ..Default::default() });
    assert_eq!(ids(&query.apply(&rows)), vec!["2"]);
  }
}
