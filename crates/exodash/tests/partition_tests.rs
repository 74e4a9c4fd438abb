mod common;

use std::sync::Arc;

use common::{ids, row, rows, FakeBackend};
use exodash::classify::ClassificationForm;
use exodash::client::ApiError;
use exodash::model::{Disposition, Provenance, RowId};
use exodash::partition::{HoldoutManager, LoadState, Mode, PartitionError};

async fn loaded(backend: &Arc<FakeBackend>) -> HoldoutManager {
  let manager = HoldoutManager::new(backend.clone());
  manager.reload().await.unwrap();
  manager
}

async fn assert_mirrors_server(manager: &HoldoutManager, backend: &FakeBackend) {
  let snapshot = manager.snapshot().await;
  assert_eq!(ids(snapshot.training()), ids(&backend.training()));
  assert_eq!(ids(snapshot.held_out()), ids(&backend.held_out()));
}

#[tokio::test]
async fn test_move_to_held_out() {
  let backend = Arc::new(FakeBackend::new(vec![row("1"), row("2")], vec![]));
  let manager = loaded(&backend).await;

  manager.move_to_held_out(&RowId::new("1")).await.unwrap();

  let snapshot = manager.snapshot().await;
  assert_eq!(ids(snapshot.training()), ["2"]);
  assert_eq!(ids(snapshot.held_out()), ["1"]);
  assert_mirrors_server(&manager, &backend).await;
}

#[tokio::test]
async fn test_failed_held_out_write_rolls_back() {
  let backend = Arc::new(FakeBackend::new(vec![row("1"), row("2")], vec![]));
  let manager = loaded(&backend).await;
  backend.fail_next("replace_held_out", ApiError::rejected(500, "Internal Server Error"));

  let err = manager.move_to_held_out(&RowId::new("1")).await.unwrap_err();

  assert!(matches!(err, PartitionError::Remote(ApiError::Rejected { status: 500, .. })), "got {err:?}");
  let snapshot = manager.snapshot().await;
  assert_eq!(ids(snapshot.training()), ["1", "2"]);
  assert!(snapshot.held_out().is_empty());
  // training was written then restored
  assert_eq!(backend.calls("save_training"), 2);
  assert_mirrors_server(&manager, &backend).await;
}

#[tokio::test]
async fn test_failed_training_write_rolls_back() {
  let backend = Arc::new(FakeBackend::new(vec![row("1")], vec![row("2")]));
  let manager = loaded(&backend).await;
  backend.fail_next("save_training", ApiError::unreachable("connection reset"));

  let err = manager.move_to_training(&RowId::new("2")).await.unwrap_err();

  assert!(err.is_retryable());
  assert!(!err.needs_reload());
  assert_eq!(backend.calls("replace_held_out"), 2);
  assert_mirrors_server(&manager, &backend).await;
  assert_eq!(manager.snapshot().await.load_state, LoadState::Loaded);
}

#[tokio::test]
async fn test_both_writes_failing_leaves_nothing_to_undo() {
  let backend = Arc::new(FakeBackend::new(vec![row("1"), row("2")], vec![]));
  let manager = loaded(&backend).await;
  backend.fail_next("replace_held_out", ApiError::rejected(500, "boom"));
  backend.fail_next("save_training", ApiError::unreachable("gone"));

  let err = manager.move_to_held_out(&RowId::new("1")).await.unwrap_err();

  assert!(matches!(err, PartitionError::Remote(_)), "got {err:?}");
  assert_eq!(backend.calls("save_training"), 1);
  assert_mirrors_server(&manager, &backend).await;
}

#[tokio::test]
async fn test_failed_rollback_reports_divergence() {
  let backend = Arc::new(FakeBackend::new(vec![row("1"), row("2")], vec![]));
  let manager = loaded(&backend).await;
  // training write lands, held-out write fails, restoring training fails
  backend.fail_next("replace_held_out", ApiError::rejected(500, "boom"));
  backend.pass_next("save_training");
  backend.fail_next("save_training", ApiError::unreachable("gone"));

  let err = manager.move_to_held_out(&RowId::new("1")).await.unwrap_err();

  assert!(matches!(err, PartitionError::Diverged { .. }), "got {err:?}");
  assert!(err.needs_reload());
  let snapshot = manager.snapshot().await;
  assert!(matches!(snapshot.load_state, LoadState::Failed(_)));
  assert_eq!(ids(snapshot.training()), ["1", "2"]);
  assert_eq!(ids(&backend.training()), ["2"]);

  manager.reload().await.unwrap();
  assert_eq!(manager.snapshot().await.load_state, LoadState::Loaded);
  assert_mirrors_server(&manager, &backend).await;
}

#[tokio::test]
async fn test_random_split_reloads_server_counts() {
  let backend = Arc::new(FakeBackend::new(rows(1..101), vec![]));
  let manager = loaded(&backend).await;
  manager.set_holdout_percentage(20).await.unwrap();

  let outcome = manager.random_split().await.unwrap();

  assert_eq!(outcome.training_count, 80);
  assert_eq!(outcome.held_out_count, 20);
  assert!(outcome.task_id.is_some());

  let snapshot = manager.snapshot().await;
  assert_eq!(snapshot.mode, Mode::Test);
  assert_eq!(snapshot.training().len(), 80);
  assert_eq!(snapshot.held_out().len(), 20);
  assert!(snapshot.partition.is_disjoint());
  assert_mirrors_server(&manager, &backend).await;
}

#[tokio::test]
async fn test_split_with_failed_reload_is_stale() {
  let backend = Arc::new(FakeBackend::new(rows(1..11), vec![]));
  let manager = loaded(&backend).await;
  backend.fail_next("fetch_held_out", ApiError::unreachable("timeout"));

  let err = manager.random_split().await.unwrap_err();

  assert!(err.needs_reload());
  let snapshot = manager.snapshot().await;
  assert!(matches!(snapshot.load_state, LoadState::Failed(_)));
  assert_eq!(snapshot.training().len(), 10);

  manager.reload().await.unwrap();
  assert_eq!(manager.snapshot().await.held_out().len(), 2);
  assert_mirrors_server(&manager, &backend).await;
}

#[tokio::test]
async fn test_exit_test_mode_folds_and_is_idempotent() {
  let backend = Arc::new(FakeBackend::new(rows(1..21), vec![]));
  let manager = loaded(&backend).await;
  manager.random_split().await.unwrap();
  assert_eq!(manager.snapshot().await.held_out().len(), 4);

  manager.exit_test_mode().await.unwrap();
  let snapshot = manager.snapshot().await;
  assert_eq!(snapshot.mode, Mode::Default);
  assert_eq!(snapshot.training().len(), 20);
  assert!(snapshot.held_out().is_empty());
  assert_mirrors_server(&manager, &backend).await;

  let splits = backend.calls("split_dataset");
  let task = manager.exit_test_mode().await.unwrap();
  assert!(task.is_none());
  assert_eq!(backend.calls("split_dataset"), splits);
  assert_eq!(manager.snapshot().await.partition, snapshot.partition);
}

#[tokio::test]
async fn test_exit_before_load_still_folds_server_rows() {
  let backend = Arc::new(FakeBackend::new(rows(1..4), rows(4..6)));
  let manager = HoldoutManager::new(backend.clone());

  let task = manager.exit_test_mode().await.unwrap();

  assert!(task.is_some());
  assert_eq!(backend.calls("split_dataset"), 1);
  assert!(backend.held_out().is_empty());
  let snapshot = manager.snapshot().await;
  assert_eq!(snapshot.load_state, LoadState::Loaded);
  assert_eq!(snapshot.mode, Mode::Default);
  assert_eq!(ids(snapshot.training()), ["1", "2", "3", "4", "5"]);
  assert!(snapshot.held_out().is_empty());
  assert_mirrors_server(&manager, &backend).await;
}

#[tokio::test]
async fn test_exit_before_load_with_nothing_held_out() {
  let backend = Arc::new(FakeBackend::new(rows(1..4), vec![]));
  let manager = HoldoutManager::new(backend.clone());

  assert!(manager.exit_test_mode().await.unwrap().is_none());
  assert_eq!(backend.calls("split_dataset"), 0);
  assert_eq!(manager.snapshot().await.training().len(), 3);

  backend.fail_next("fetch_held_out", ApiError::GatewayTimeout);
  let fresh = HoldoutManager::new(backend.clone());
  assert!(matches!(fresh.exit_test_mode().await, Err(PartitionError::Remote(ApiError::GatewayTimeout))));
  assert!(matches!(fresh.snapshot().await.load_state, LoadState::Failed(_)));
  assert_eq!(backend.calls("split_dataset"), 0);
}

#[tokio::test]
async fn test_failed_fold_keeps_held_out_rows() {
  let backend = Arc::new(FakeBackend::new(vec![row("1")], vec![row("2")]));
  let manager = loaded(&backend).await;
  manager.enter_test_mode().await;
  backend.fail_next("split_dataset", ApiError::GatewayTimeout);

  assert!(manager.exit_test_mode().await.is_err());

  let snapshot = manager.snapshot().await;
  assert_eq!(snapshot.mode, Mode::Test);
  assert_eq!(ids(snapshot.held_out()), ["2"]);
}

#[tokio::test]
async fn test_disjoint_and_conserved_across_moves() {
  let backend = Arc::new(FakeBackend::new(rows(1..31), rows(31..41)));
  let manager = loaded(&backend).await;

  // small linear congruential generator so the sequence is reproducible
  let mut seed: u64 = 42;
  let mut next = move |bound: u64| {
    seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (seed >> 33) % bound
  };

  for step in 0..200 {
    let snapshot = manager.snapshot().await;
    let to_held_out = next(2) == 0;
    let pool = if to_held_out { snapshot.training() } else { snapshot.held_out() };
    if pool.is_empty() {
      continue;
    }
    let id = pool[next(pool.len() as u64) as usize].id.clone();

    match next(6) {
      0 => backend.fail_next("replace_held_out", ApiError::rejected(500, "flaky")),
      1 => backend.fail_next("save_training", ApiError::unreachable("flaky")),
      _ => {}
    }

    let result = if to_held_out {
      manager.move_to_held_out(&id).await
    } else {
      manager.move_to_training(&id).await
    };
    if let Err(e) = &result {
      assert!(!e.needs_reload(), "step {step}: {e}");
    }

    let snapshot = manager.snapshot().await;
    assert!(snapshot.partition.is_disjoint(), "step {step}");
    assert_eq!(snapshot.partition.len(), 40, "step {step}");
    assert_mirrors_server(&manager, &backend).await;
  }
}

#[tokio::test]
async fn test_unknown_row_is_not_moved() {
  let backend = Arc::new(FakeBackend::new(vec![row("1")], vec![]));
  let manager = loaded(&backend).await;
  let before = backend.total_calls();

  let err = manager.move_to_training(&RowId::new("1")).await.unwrap_err();

  assert!(matches!(err, PartitionError::RowNotFound { .. }));
  assert_eq!(err.to_string(), "Row 1 not found in held-out data");
  assert_eq!(backend.total_calls(), before);
}

#[tokio::test]
async fn test_user_rows_can_be_added_and_removed() {
  let backend = Arc::new(FakeBackend::new(vec![row("1")], vec![]));
  let manager = loaded(&backend).await;
  let form = ClassificationForm {
    period: "3.5".into(),
    duration: "1.2".into(),
    depth: "250".into(),
    prad: "1.1".into(),
    teq: "400".into(),
  };

  let (added, task) = manager.add_user_row(&form, Disposition::FalsePositive).await.unwrap();
  assert!(task.is_some());
  assert_eq!(added.provenance, Provenance::User);
  assert_eq!(added.name.as_deref(), Some("User Planet 1"));
  assert_mirrors_server(&manager, &backend).await;

  manager.remove_row(&added.id).await.unwrap();
  assert_eq!(ids(manager.snapshot().await.training()), ["1"]);
  assert_mirrors_server(&manager, &backend).await;
}

#[tokio::test]
async fn test_mission_rows_cannot_be_removed() {
  let backend = Arc::new(FakeBackend::new(vec![row("1")], vec![]));
  let manager = loaded(&backend).await;

  let err = manager.remove_row(&RowId::new("1")).await.unwrap_err();

  assert!(matches!(err, PartitionError::NotRemovable { provenance: Provenance::Koi, .. }));
  assert_eq!(backend.calls("remove_row"), 0);
  assert_eq!(manager.snapshot().await.training().len(), 1);
}

#[tokio::test]
async fn test_relabel_persists_owning_collection() {
  let backend = Arc::new(FakeBackend::new(vec![row("1")], vec![row("2")]));
  let manager = loaded(&backend).await;

  let task = manager.set_disposition(&RowId::new("2"), Disposition::FalsePositive).await.unwrap();

  assert!(task.is_none());
  assert_eq!(backend.calls("save_training"), 0);
  assert_eq!(backend.held_out()[0].disposition, Some(Disposition::FalsePositive));
  assert_mirrors_server(&manager, &backend).await;
}

#[tokio::test]
async fn test_upload_replaces_training_mirror() {
  let backend = Arc::new(FakeBackend::new(vec![row("1")], vec![row("2")]));
  let manager = loaded(&backend).await;
  let csv = "type,id,name,disposition,period,duration,depth,prad,teq\n\
             user,u-1,Upload One,CANDIDATE,1.5,2,300,1.2,500\n\
             user,u-2,Upload Two,FALSE POSITIVE,2.5,3,400,1.4,600\n";

  let added = manager.upload_user_data("mine.csv", csv.as_bytes().to_vec()).await.unwrap();

  assert_eq!(added, 2);
  let snapshot = manager.snapshot().await;
  assert_eq!(ids(snapshot.training()), ["1", "u-1", "u-2"]);
  assert_eq!(ids(snapshot.held_out()), ["2"]);
}

#[tokio::test]
async fn test_invalid_form_never_reaches_server() {
  let backend = Arc::new(FakeBackend::new(vec![], vec![]));
  let manager = loaded(&backend).await;
  let before = backend.total_calls();
  let form = ClassificationForm { period: "abc".into(), ..Default::default() };

  let err = manager.add_user_row(&form, Disposition::Candidate).await.unwrap_err();

  assert!(matches!(err, PartitionError::Validation(_)));
  assert_eq!(backend.total_calls(), before);
}
