//! Console output for the exodash tools.
//!
//! Every line goes to stderr behind a short colored level tag, so stdout stays
//! free for tables and JSON that other programs may consume.
//!
//! ```no_run
//! exolog::info("loading training collection");
//! exolog::success!("moved row 10797460 to held-out");
//! ```

use colored::*;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "request-log")]
pub mod request_log;

static QUIET: AtomicBool = AtomicBool::new(false);

/// Suppress everything below `error` (used by `--quiet` and scripted runs)
pub fn set_quiet(quiet: bool) {
  QUIET.store(quiet, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
  QUIET.load(Ordering::Relaxed)
}

/// Write each line of `message` to stderr
pub fn log(message: &str) {
  for line in message.lines() {
    eprintln!("{line}");
  }
}

/// Render a level tag padded so messages line up in a column
pub fn tag(color: Color, label: &str) -> String {
  let pad = 7usize.saturating_sub(label.len() + 2);
  format!("[{}]{:<pad$}", label.color(color).bold(), "")
}

fn emit(color: Color, label: &str, message: &str) {
  let prefix = tag(color, label);
  for line in message.lines() {
    log(&format!("{prefix} {line}"));
  }
}

/// General progress information
pub fn info(message: &str) {
  if !is_quiet() {
    emit(Color::Blue, "info", message);
  }
}

/// Something the user should look at, but the operation went on
pub fn warn(message: &str) {
  if !is_quiet() {
    emit(Color::Yellow, "warn", message);
  }
}

/// A failed operation. Never suppressed.
pub fn error(message: &str) {
  emit(Color::Red, "error", message);
}

pub fn debug(message: &str) {
  if !is_quiet() {
    emit(Color::Magenta, "debug", message);
  }
}

/// A remote write that settled successfully
pub fn success(message: &str) {
  if !is_quiet() {
    emit(Color::Green, "ok", message);
  }
}

#[macro_export]
macro_rules! info {
  ($msg:expr) => {
    $crate::info($msg)
  };
}

#[macro_export]
macro_rules! warn {
  ($msg:expr) => {
    $crate::warn($msg)
  };
}

#[macro_export]
macro_rules! error {
  ($msg:expr) => {
    $crate::error($msg)
  };
}

#[macro_export]
macro_rules! debug {
  ($msg:expr) => {
    $crate::debug($msg)
  };
}

#[macro_export]
macro_rules! success {
  ($msg:expr) => {
    $crate::success($msg)
  };
}
