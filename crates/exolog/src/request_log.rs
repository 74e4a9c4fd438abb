//! Append-only JSONL log of proxied requests.
//!
//! One line per entry. The file is never truncated by this module; readers
//! skip lines they cannot parse so a torn final write does not poison the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-request metadata attached to an entry
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestInfo {
  pub request_id: String,
  pub method: String,
  pub path: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub upstream: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<u16>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
  pub timestamp: DateTime<Utc>,
  pub level: String,
  pub message: String,
  pub component: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub request: Option<RequestInfo>,
}

struct Store {
  path: PathBuf,
  echo: bool,
}

impl Store {
  fn open(path: &Path, echo: bool) -> std::io::Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Self { path: path.to_path_buf(), echo })
  }

  fn append(&self, entry: &LogEntry) -> std::io::Result<()> {
    let line = serde_json::to_string(entry)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut file = OpenOptions::new().append(true).open(&self.path)?;
    writeln!(file, "{line}")?;
    file.flush()
  }

  fn read(&self, limit: Option<usize>, level: Option<&str>) -> std::io::Result<Vec<LogEntry>> {
    let file = match std::fs::File::open(&self.path) {
      Ok(file) => file,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e),
    };

    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
      let line = line?;
      if line.trim().is_empty() {
        continue;
      }
      let Ok(entry) = serde_json::from_str::<LogEntry>(&line) else {
        continue;
      };
      if level.map_or(true, |wanted| wanted == "all" || entry.level == wanted) {
        entries.push(entry);
      }
    }

    // oldest first, keeping only the newest `limit`
    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    if let Some(limit) = limit {
      let skip = entries.len().saturating_sub(limit);
      entries.drain(..skip);
    }
    Ok(entries)
  }
}

/// Shared handle to a JSONL request log
#[derive(Clone)]
pub struct RequestLog {
  store: Arc<Mutex<Store>>,
}

impl RequestLog {
  /// Open (creating if needed) the log at `path`, echoing entries to the console
  pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
    Self::open_with_echo(path, true)
  }

  pub fn open_with_echo<P: AsRef<Path>>(path: P, echo: bool) -> std::io::Result<Self> {
    let store = Store::open(path.as_ref(), echo)?;
    Ok(Self { store: Arc::new(Mutex::new(store)) })
  }

  pub async fn path(&self) -> PathBuf {
    self.store.lock().await.path.clone()
  }

  /// Append an entry. Write failures are reported on the console, never returned.
  pub async fn record(
    &self,
    level: &str,
    message: &str,
    component: &str,
    request: Option<RequestInfo>,
  ) {
    let entry = LogEntry {
      timestamp: Utc::now(),
      level: level.to_string(),
      message: message.to_string(),
      component: component.to_string(),
      request,
    };

    let store = self.store.lock().await;
    if let Err(e) = store.append(&entry) {
      crate::error(&format!("could not write request log {}: {e}", store.path.display()));
    }
    if store.echo {
      match level {
        "error" => crate::error(message),
        "warn" => crate::warn(message),
        "debug" => crate::debug(message),
        _ => crate::info(message),
      }
    }
  }

  pub async fn info(&self, message: &str, component: &str) {
    self.record("info", message, component, None).await;
  }

  pub async fn warn(&self, message: &str, component: &str) {
    self.record("warn", message, component, None).await;
  }

  pub async fn error(&self, message: &str, component: &str) {
    self.record("error", message, component, None).await;
  }

  /// Newest `limit` entries (oldest first), optionally filtered by level
  pub async fn recent(
    &self,
    limit: Option<usize>,
    level: Option<&str>,
  ) -> std::io::Result<Vec<LogEntry>> {
    self.store.lock().await.read(limit, level)
  }
}
