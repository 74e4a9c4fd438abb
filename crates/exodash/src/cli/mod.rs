//! Terminal front-end: command handlers and table rendering

pub mod commands;
pub mod display;

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::client::{DatasetApi, HttpDatasetApi};
use crate::config::Config;
use crate::model::{Disposition, Provenance};
use crate::partition::{HoldoutManager, PartitionSnapshot};
use crate::table::{TableFilter, TableQuery, Tabular};
use crate::tasks::TaskPoller;

/// Everything one CLI invocation needs
pub struct Session {
  pub config: Config,
  pub api: Arc<dyn DatasetApi>,
  pub manager: HoldoutManager,
}

impl Session {
  pub fn connect(config: Config) -> Result<Self> {
    let api: Arc<dyn DatasetApi> = Arc::new(HttpDatasetApi::new(&config.client_config())?);
    Self::with_api(config, api)
  }

  pub fn with_api(config: Config, api: Arc<dyn DatasetApi>) -> Result<Self> {
    let manager = HoldoutManager::with_percentage(Arc::clone(&api), config.holdout_percentage()?);
    Ok(Self { config, api, manager })
  }

  pub fn poller(&self) -> TaskPoller {
    TaskPoller::new(Arc::clone(&self.api))
      .with_interval(self.config.poll_interval())
      .with_deadline(self.config.task_deadline())
  }

  /// Fetch both collections; nothing else works on an unloaded partition
  pub async fn load(&self) -> Result<PartitionSnapshot> {
    Ok(self.manager.reload().await?)
  }
}

/// Paging, sorting and filtering flags shared by the table commands
#[derive(Debug, Clone, Default, clap::Args)]
pub struct TableView {
  /// Page to show (1-based)
  #[arg(short, long, default_value = "1")]
  pub page: usize,
  /// Sort column; give the same column twice for descending order
  #[arg(short, long)]
  pub sort: Vec<String>,
  /// Only rows of these types (koi, toi, k2, user)
  #[arg(short = 't', long = "type", value_delimiter = ',')]
  pub types: Vec<Provenance>,
  /// Only rows with this disposition
  #[arg(short, long)]
  pub disposition: Option<Disposition>,
  /// Case-insensitive match on id or name
  #[arg(long)]
  pub search: Option<String>,
}

impl TableView {
  pub fn query<T: Tabular>(&self, rows_per_page: usize) -> Result<TableQuery> {
    let mut query = TableQuery { rows_per_page, ..Default::default() };
    query.set_filter(TableFilter {
      provenances: self.types.iter().copied().collect(),
      disposition: self.disposition,
      search: self.search.clone(),
    });
    for column in &self.sort {
      if !T::COLUMNS.contains(&column.as_str()) {
        bail!("Unknown sort column '{column}'. Available: {}", T::COLUMNS.join(", "));
      }
      query.sort_by(column);
    }
    query.page = self.page;
    Ok(query)
  }
}
