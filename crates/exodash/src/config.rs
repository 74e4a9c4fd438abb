//! Configuration for the dashboard CLI and the proxy
//!
//! Read from YAML at `$EXODASH_CONFIG` or `~/.exodash/config.yaml`, then
//! overridden by `EXODASH_*` environment variables. A missing file means
//! defaults.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::client::ClientConfig;
use crate::partition::HoldoutPercentage;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Failed to read config {path}: {source}")]
  Read { path: PathBuf, source: std::io::Error },

  #[error("Invalid config {path}: {source}")]
  Parse { path: PathBuf, source: serde_yaml::Error },

  #[error("Invalid value for {key}: {value}")]
  InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
  /// Base URL of the ML service
  #[serde(default = "default_server_url")]
  pub server_url: String,
  /// Per-request timeout for the dataset client
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
  /// Give up polling a task after this long; unset polls until done
  #[serde(default)]
  pub task_deadline_secs: Option<u64>,
  #[serde(default = "default_rows_per_page")]
  pub rows_per_page: usize,
  #[serde(default = "default_holdout_percentage")]
  pub holdout_percentage: u8,
  /// Directory holding the mission catalog CSVs
  #[serde(default)]
  pub catalog_dir: Option<PathBuf>,
  #[serde(default)]
  pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
  #[serde(default = "default_proxy_bind")]
  pub bind: SocketAddr,
  #[serde(default = "default_server_url")]
  pub upstream: String,
  #[serde(default = "default_proxy_timeout_secs")]
  pub timeout_secs: u64,
  /// JSONL request log; defaults to `~/.exodash/proxy.log`
  #[serde(default)]
  pub log_file: Option<PathBuf>,
}

fn default_server_url() -> String {
  "http://127.0.0.1:5001".to_string()
}
/// Longer than the proxy's upstream timeout so a stalled service surfaces as
/// the proxy's 504 rather than a client-side timeout
fn default_timeout_secs() -> u64 {
  90
}
fn default_poll_interval_ms() -> u64 {
  2000
}
fn default_rows_per_page() -> usize {
  crate::table::ROWS_PER_PAGE
}
fn default_holdout_percentage() -> u8 {
  HoldoutPercentage::default().get()
}
fn default_proxy_bind() -> SocketAddr {
  SocketAddr::from(([127, 0, 0, 1], 3000))
}
fn default_proxy_timeout_secs() -> u64 {
  60
}

impl Default for ProxyConfig {
  fn default() -> Self {
    Self {
      bind: default_proxy_bind(),
      upstream: default_server_url(),
      timeout_secs: default_proxy_timeout_secs(),
      log_file: None,
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      server_url: default_server_url(),
      timeout_secs: default_timeout_secs(),
      poll_interval_ms: default_poll_interval_ms(),
      task_deadline_secs: None,
      rows_per_page: default_rows_per_page(),
      holdout_percentage: default_holdout_percentage(),
      catalog_dir: None,
      proxy: ProxyConfig::default(),
    }
  }
}

impl Config {
  pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
      .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    if content.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
  }

  /// `$EXODASH_CONFIG`, else `~/.exodash/config.yaml`
  pub fn default_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("EXODASH_CONFIG") {
      return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".exodash").join("config.yaml"))
  }

  /// File (if any) plus environment overrides
  pub fn load() -> Result<Self, ConfigError> {
    let mut config = match Self::default_path() {
      Some(path) if path.exists() => Self::load_from_file(&path)?,
      _ => Config::default(),
    };
    config.apply_env()?;
    Ok(config)
  }

  pub fn apply_env(&mut self) -> Result<(), ConfigError> {
    if let Ok(url) = std::env::var("EXODASH_SERVER_URL") {
      self.server_url = url;
    }
    if let Some(secs) = env_number("EXODASH_TIMEOUT_SECS")? {
      self.timeout_secs = secs;
    }
    if let Some(ms) = env_number("EXODASH_POLL_INTERVAL_MS")? {
      self.poll_interval_ms = ms;
    }
    if let Ok(upstream) = std::env::var("EXODASH_PROXY_UPSTREAM") {
      self.proxy.upstream = upstream;
    }
    Ok(())
  }

  pub fn client_config(&self) -> ClientConfig {
    ClientConfig { base_url: self.server_url.clone(), timeout_secs: self.timeout_secs }
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms.max(1))
  }

  pub fn task_deadline(&self) -> Option<Duration> {
    self.task_deadline_secs.map(Duration::from_secs)
  }

  pub fn holdout_percentage(&self) -> Result<HoldoutPercentage, ConfigError> {
    HoldoutPercentage::new(self.holdout_percentage).map_err(|e| ConfigError::InvalidValue {
      key: "holdout_percentage".into(),
      value: e.to_string(),
    })
  }

  /// Where the proxy writes its request log
  pub fn proxy_log_file(&self) -> PathBuf {
    self.proxy.log_file.clone().unwrap_or_else(|| {
      dirs::home_dir().unwrap_or_else(std::env::temp_dir).join(".exodash").join("proxy.log")
    })
  }
}

fn env_number(key: &str) -> Result<Option<u64>, ConfigError> {
  match std::env::var(key) {
    Ok(value) => value
      .trim()
      .parse()
      .map(Some)
      .map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value }),
    Err(_) => Ok(None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use std::fs;
  use tempfile::TempDir;

  const ENV_KEYS: [&str; 5] = [
    "EXODASH_CONFIG",
    "EXODASH_SERVER_URL",
    "EXODASH_TIMEOUT_SECS",
    "EXODASH_POLL_INTERVAL_MS",
    "EXODASH_PROXY_UPSTREAM",
  ];

  fn clear_env() {
    for key in ENV_KEYS {
      std::env::remove_var(key);
    }
  }

  #[test]
  fn defaults() {
    let config = Config::default();
    assert_eq!(config.server_url, "http://127.0.0.1:5001");
    assert_eq!(config.poll_interval(), Duration::from_secs(2));
    assert_eq!(config.proxy.timeout_secs, 60);
    assert_eq!(config.proxy.bind.port(), 3000);
    assert_eq!(config.rows_per_page, 50);
    assert_eq!(config.holdout_percentage().unwrap().get(), 20);
    assert_eq!(config.task_deadline(), None);
    assert_eq!(config.timeout_secs, 90);
    assert!(config.timeout_secs > config.proxy.timeout_secs);
    assert_eq!(config.client_config().timeout_secs, crate::client::ClientConfig::default().timeout_secs);
  }

  #[test]
  fn partial_yaml_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "server_url: http://ml:5001\nproxy:\n  timeout_secs: 5\n").unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.server_url, "http://ml:5001");
    assert_eq!(config.proxy.timeout_secs, 5);
    assert_eq!(config.proxy.upstream, "http://127.0.0.1:5001");
    assert_eq!(config.timeout_secs, 90);
  }

  #[test]
  fn bad_yaml_names_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "timeout_secs: [not, a, number]\n").unwrap();

    let err = Config::load_from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("config.yaml"));
  }

  #[test]
  #[serial]
  fn env_overrides_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "server_url: http://from-file:5001\npoll_interval_ms: 500\n").unwrap();

    std::env::set_var("EXODASH_CONFIG", &path);
    std::env::set_var("EXODASH_SERVER_URL", "http://from-env:5001");
    std::env::set_var("EXODASH_PROXY_UPSTREAM", "http://upstream:9000");

    let config = Config::load().unwrap();
    assert_eq!(config.server_url, "http://from-env:5001");
    assert_eq!(config.poll_interval_ms, 500);
    assert_eq!(config.proxy.upstream, "http://upstream:9000");
    clear_env();
  }

  #[test]
  #[serial]
  fn non_numeric_env_is_rejected() {
    clear_env();
    std::env::set_var("EXODASH_CONFIG", "/nonexistent/exodash.yaml");
    std::env::set_var("EXODASH_TIMEOUT_SECS", "soon");

    let err = Config::load().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "EXODASH_TIMEOUT_SECS"));
    clear_env();
  }
}
