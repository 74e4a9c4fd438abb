//! Display formatting for CLI output

use colored::*;

use crate::loader::CatalogEntry;
use crate::model::{ClassificationResult, Disposition, HealthStatus, Row, TaskState, TaskStatus};
use crate::partition::{Mode, PartitionSnapshot};
use crate::table::TablePage;

pub fn number(value: Option<f64>, places: usize) -> String {
  match value {
    Some(v) => format!("{v:.places$}"),
    None => "-".to_string(),
  }
}

/// Cut `text` to `width` characters, marking the cut
pub fn truncate(text: &str, width: usize) -> String {
  if text.chars().count() <= width {
    return text.to_string();
  }
  let kept: String = text.chars().take(width.saturating_sub(1)).collect();
  format!("{kept}…")
}

fn disposition(value: Option<Disposition>) -> ColoredString {
  match value {
    Some(Disposition::Candidate) => "CANDIDATE".green(),
    Some(Disposition::FalsePositive) => "FALSE POSITIVE".red(),
    None => "unknown".dimmed(),
  }
}

fn footer<T>(page: &TablePage<'_, T>) {
  if page.total_rows == 0 {
    println!("{}", "No rows match.".dimmed());
    return;
  }
  let first = page.first_index + 1;
  let last = page.first_index + page.rows.len();
  println!(
    "{}",
    format!("Rows {first}-{last} of {} | page {} of {}", page.total_rows, page.page, page.total_pages).dimmed()
  );
}

pub fn rows_table(title: &str, page: &TablePage<'_, Row>) {
  println!("{}", title.blue().bold());
  println!(
    "{}",
    format!(
      "{:<6} {:<16} {:<22} {:<15} {:>10} {:>8} {:>10} {:>8} {:>7}",
      "type", "id", "name", "disposition", "period", "duration", "depth", "prad", "teq"
    )
    .bold()
  );
  for row in &page.rows {
    // pad before coloring so escape codes don't break alignment
    let label = format!("{:<15}", row.disposition.map(|d| d.label()).unwrap_or("unknown"));
    let label = match row.disposition {
      Some(Disposition::Candidate) => label.green(),
      Some(Disposition::FalsePositive) => label.red(),
      None => label.dimmed(),
    };
    println!(
      "{:<6} {:<16} {:<22} {} {:>10} {:>8} {:>10} {:>8} {:>7}",
      row.provenance.mission_name(),
      truncate(row.id.as_str(), 16),
      truncate(row.display_name(), 22),
      label,
      number(row.period, 2),
      number(row.duration, 2),
      number(row.depth, 1),
      number(row.prad, 2),
      number(row.teq, 0),
    );
  }
  footer(page);
}

pub fn catalog_table(title: &str, page: &TablePage<'_, CatalogEntry>) {
  println!("{}", title.blue().bold());
  println!(
    "{}",
    format!(
      "{:<14} {:<22} {:<11} {:<16} {:>10} {:>7} {:>7} {:>7} {:>6}",
      "planet_id", "name", "discovered", "status", "period", "prad", "teq", "steff", "srad"
    )
    .bold()
  );
  for entry in &page.rows {
    println!(
      "{:<14} {:<22} {:<11} {:<16} {:>10} {:>7} {:>7} {:>7} {:>6}",
      truncate(&entry.planet_id, 14),
      truncate(entry.name.as_deref().unwrap_or("-"), 22),
      entry.discovered.as_deref().unwrap_or("-"),
      truncate(entry.status.as_deref().unwrap_or("Unknown"), 16),
      number(entry.orbital_period, 2),
      number(entry.planet_radius, 2),
      number(entry.equilibrium_temp, 0),
      number(entry.stellar_temp, 0),
      number(entry.stellar_radius, 2),
    );
  }
  footer(page);
}

pub fn partition_summary(snapshot: &PartitionSnapshot) {
  let mode = match snapshot.mode {
    Mode::Default => "Default Mode".cyan(),
    Mode::Test => "Test Mode".yellow(),
  };
  println!("{} {}", "Mode:".bold(), mode);
  println!("{} {}", "Training rows:".bold(), snapshot.training().len());
  println!("{} {}", "Held-out rows:".bold(), snapshot.held_out().len());
  println!("{} {}", "Hold-out percentage:".bold(), snapshot.holdout_percentage);
}

pub fn health(status: &HealthStatus) {
  let state = if status.status.eq_ignore_ascii_case("healthy") {
    status.status.green()
  } else {
    status.status.yellow()
  };
  println!("{} {}", "ML service:".bold(), state);
  if let Some(llm) = status.llm_available {
    println!("{} {}", "LLM classifier:".bold(), if llm { "available".green() } else { "unavailable".red() });
  }
  if let Some(models) = status.models_loaded {
    println!("{} {models}", "Models loaded:".bold());
  }
}

pub fn classification(result: &ClassificationResult) {
  let prediction = match result.prediction {
    Disposition::Candidate => "CANDIDATE".green().bold(),
    Disposition::FalsePositive => "FALSE POSITIVE".red().bold(),
  };
  println!("{} {}", "Prediction:".bold(), prediction);
  println!("{} {:.1}%", "Confidence:".bold(), result.confidence * 100.0);
  println!("{} {}", "Model:".bold(), result.model);
  if !result.processing_time.is_empty() {
    println!("{} {}", "Processing time:".bold(), result.processing_time);
  }
  println!(
    "{} {} ({} agree)",
    "Similar examples used:".bold(),
    result.similar_examples_used,
    result.agreeing_examples()
  );

  if result.similar_examples.is_empty() {
    return;
  }
  println!();
  println!("{}", "Nearest examples".blue().bold());
  for (i, example) in result.similar_examples.iter().enumerate() {
    let name = example
      .name
      .clone()
      .or_else(|| example.id.as_ref().map(|id| id.to_string().trim_matches('"').to_string()))
      .unwrap_or_else(|| format!("#{}", i + 1));
    println!(
      "  {:>2}. {:<22} {} period={} prad={} teq={}",
      i + 1,
      truncate(&name, 22),
      disposition(example.disposition),
      number(example.period, 2),
      number(example.prad, 2),
      number(example.teq, 0),
    );
  }
}

pub fn task_progress(status: &TaskStatus) {
  let state = match status.status {
    TaskState::Pending => "pending".dimmed(),
    TaskState::Started => "started".cyan(),
    TaskState::Progress => "building".cyan(),
    TaskState::Success => "done".green(),
    TaskState::Failure => "failed".red(),
    TaskState::Unknown => "unknown".yellow(),
  };
  match status.progress {
    Some(p) => exolog::info(&format!("Vector index: {state} ({p:.0}%)")),
    None => exolog::info(&format!("Vector index: {state}")),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truncate_marks_cut() {
    assert_eq!(truncate("Kepler-227 b", 20), "Kepler-227 b");
    assert_eq!(truncate("Kepler-227 b", 7), "Kepler…");
  }

  #[test]
  fn missing_numbers_render_as_dash() {
    assert_eq!(number(None, 2), "-");
    assert_eq!(number(Some(9.4881), 2), "9.49");
    assert_eq!(number(Some(793.4), 0), "793");
  }
}
