use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::classify::{ClassificationForm, ClassificationSession, Preset};
use crate::cli::display;
use crate::cli::{Session, TableView};
use crate::loader::{self, CatalogEntry, Mission};
use crate::model::{Disposition, Row, RowId, TaskId};
use crate::partition::PartitionError;

/// What to classify
pub enum ClassifyInput {
  Form(ClassificationForm),
  Preset(Preset),
  Row(RowId),
}

/// Service health plus partition counts
pub async fn status(session: &Session) -> Result<()> {
  match session.api.health().await {
    Ok(health) => display::health(&health),
    Err(e) => exolog::warn(&format!("Health check failed: {e}")),
  }
  let snapshot = session.load().await?;
  println!();
  display::partition_summary(&snapshot);
  Ok(())
}

pub async fn dataset(session: &Session, held_out: bool, view: &TableView) -> Result<()> {
  let snapshot = session.load().await?;
  let (title, rows) = if held_out {
    ("Held-out data", snapshot.held_out())
  } else {
    ("Training data", snapshot.training())
  };

  let query = view.query::<Row>(session.config.rows_per_page)?;
  display::rows_table(title, &query.apply(rows));
  Ok(())
}

/// Mission CSVs are read from `--file`, else `catalog_dir`, else `./data`
pub fn catalog(session: &Session, mission: Mission, file: Option<PathBuf>, view: &TableView) -> Result<()> {
  let path = file.unwrap_or_else(|| {
    session.config.catalog_dir.clone().unwrap_or_else(|| PathBuf::from("data")).join(mission.file_name())
  });
  let entries = loader::load_catalog(mission, &path)?;

  let query = view.query::<CatalogEntry>(session.config.rows_per_page)?;
  let title = format!("{} catalog ({})", mission.provenance().mission_name(), path.display());
  display::catalog_table(&title, &query.apply(&entries));
  Ok(())
}

pub async fn split(session: &Session, percentage: Option<u8>, wait: bool) -> Result<()> {
  if let Some(value) = percentage {
    session.manager.set_holdout_percentage(value).await?;
  }
  session.load().await?;

  let outcome = session.manager.random_split().await.map_err(explain)?;
  exolog::success(&format!(
    "Split dataset: {} training, {} held-out",
    outcome.training_count, outcome.held_out_count
  ));
  finish_task(session, outcome.task_id, wait).await
}

pub async fn hold(session: &Session, ids: &[String], wait: bool) -> Result<()> {
  move_rows(session, ids, true, wait).await
}

pub async fn release(session: &Session, ids: &[String], wait: bool) -> Result<()> {
  move_rows(session, ids, false, wait).await
}

async fn move_rows(session: &Session, ids: &[String], to_held_out: bool, wait: bool) -> Result<()> {
  session.load().await?;
  let mut last_task = None;
  for id in ids {
    let id = RowId::new(id.as_str());
    let result = if to_held_out {
      session.manager.move_to_held_out(&id).await
    } else {
      session.manager.move_to_training(&id).await
    };
    let task = result.map_err(explain)?;
    let target = if to_held_out { "held-out" } else { "training" };
    exolog::success(&format!("Moved row {id} to {target}"));
    last_task = task.or(last_task);
  }
  finish_task(session, last_task, wait).await
}

/// Leave Test Mode, folding held-out rows back into training
pub async fn reset(session: &Session, wait: bool) -> Result<()> {
  let snapshot = session.load().await?;
  let held = snapshot.held_out().len();
  let task = session.manager.exit_test_mode().await.map_err(explain)?;
  if held == 0 {
    exolog::info("Nothing held out; already in Default Mode");
  } else {
    exolog::success(&format!("Returned {held} held-out rows to training"));
  }
  finish_task(session, task, wait).await
}

pub async fn classify(session: &Session, input: ClassifyInput) -> Result<()> {
  let mut classifier = ClassificationSession::new(session.api.clone());
  match input {
    ClassifyInput::Form(form) => classifier.load(form),
    ClassifyInput::Preset(preset) => classifier.load_preset(preset),
    ClassifyInput::Row(id) => {
      session.load().await?;
      classifier.load(session.manager.test_row(&id).await?);
    }
  }

  let form = classifier.form().clone();
  exolog::info(&format!(
    "Classifying period={} duration={} depth={} prad={} teq={}",
    form.period, form.duration, form.depth, form.prad, form.teq
  ));
  let result = classifier.classify().await?;
  display::classification(result);
  Ok(())
}

pub async fn add(session: &Session, form: &ClassificationForm, disposition: Disposition, wait: bool) -> Result<()> {
  session.load().await?;
  let (row, task) = session.manager.add_user_row(form, disposition).await.map_err(explain)?;
  exolog::success(&format!("Added {} ({}) to training", row.display_name(), row.id));
  finish_task(session, task, wait).await
}

pub async fn relabel(session: &Session, id: &str, disposition: Disposition, wait: bool) -> Result<()> {
  session.load().await?;
  let id = RowId::new(id);
  let task = session.manager.set_disposition(&id, disposition).await.map_err(explain)?;
  exolog::success(&format!("Row {id} is now {disposition}"));
  finish_task(session, task, wait).await
}

pub async fn remove(session: &Session, id: &str) -> Result<()> {
  session.load().await?;
  let id = RowId::new(id);
  session.manager.remove_row(&id).await.map_err(explain)?;
  exolog::success(&format!("Removed row {id}"));
  Ok(())
}

pub async fn upload(session: &Session, path: &Path) -> Result<()> {
  let contents = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
  let file_name = path
    .file_name()
    .and_then(|n| n.to_str())
    .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;

  session.load().await?;
  let added = session.manager.upload_user_data(file_name, contents).await.map_err(explain)?;
  let snapshot = session.manager.snapshot().await;
  exolog::success(&format!(
    "Uploaded {file_name}: {added} new rows, {} training rows total",
    snapshot.training().len()
  ));
  Ok(())
}

pub async fn save(session: &Session, wait: bool) -> Result<()> {
  session.load().await?;
  let task = session.manager.save_dataset().await.map_err(explain)?;
  exolog::success("Dataset saved");
  finish_task(session, task, wait).await
}

/// Follow an index rebuild until it ends or Ctrl-C
pub async fn task(session: &Session, id: &str) -> Result<()> {
  watch_task(session, TaskId::new(id)).await
}

async fn finish_task(session: &Session, task: Option<TaskId>, wait: bool) -> Result<()> {
  match task {
    Some(task_id) if wait => watch_task(session, task_id).await,
    Some(task_id) => {
      exolog::info(&format!("Vector index rebuild started (task {task_id}); follow it with `exodash task {task_id}`"));
      Ok(())
    }
    None => Ok(()),
  }
}

async fn watch_task(session: &Session, task_id: TaskId) -> Result<()> {
  exolog::info(&format!("Watching task {task_id} (Ctrl-C stops watching)"));
  let handle = session.poller().watch(task_id.clone());
  let mut progress = handle.progress();
  let wait = handle.wait();
  tokio::pin!(wait);

  let mut listening = true;
  loop {
    tokio::select! {
      result = &mut wait => {
        return match result {
          Ok(_) => {
            exolog::success("Vector index rebuilt");
            Ok(())
          }
          Err(e) => Err(e.into()),
        };
      }
      changed = progress.changed(), if listening => {
        if changed.is_ok() {
          display::task_progress(&progress.borrow_and_update());
        } else {
          listening = false;
        }
      }
      _ = tokio::signal::ctrl_c() => {
        exolog::warn(&format!("Stopped watching task {task_id}; the rebuild continues on the server"));
        return Ok(());
      }
    }
  }
}

/// Add a hint to errors that leave the local view untrustworthy
fn explain(err: PartitionError) -> anyhow::Error {
  if err.needs_reload() {
    exolog::error("Local data may no longer match the server; run `exodash dataset` to reload");
  } else if err.is_retryable() {
    exolog::warn("The server could not be reached; the action can be retried");
  }
  anyhow::Error::new(err)
}

