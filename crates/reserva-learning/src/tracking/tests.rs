//! Tests for the tracking module

use std::collections::BTreeMap;
use std::fs;

use tempfile::TempDir;

use super::{ExperimentTracker, RunStatus};

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

#[test]
fn test_run_status_codes() {
    for status in [
        RunStatus::Running,
        RunStatus::Scheduled,
        RunStatus::Finished,
        RunStatus::Failed,
        RunStatus::Killed,
    ] {
        assert_eq!(RunStatus::from_code(status.code()), Some(status));
    }
    assert_eq!(RunStatus::Finished.code(), 3);
    assert_eq!(RunStatus::from_code(0), None);
    assert!(!RunStatus::Running.is_terminal());
    assert!(RunStatus::Failed.is_terminal());
}

// ---------------------------------------------------------------------------
// Experiments
// ---------------------------------------------------------------------------

#[test]
fn test_default_experiment_is_zero() {
    let dir = TempDir::new().unwrap();
    let tracker = ExperimentTracker::new(dir.path(), "Default").unwrap();
    assert_eq!(tracker.experiment_id(), "0");
    assert!(dir.path().join("0").join("meta.yaml").is_file());
}

#[test]
fn test_experiment_reopened_by_name() {
    let dir = TempDir::new().unwrap();
    let first = ExperimentTracker::new(dir.path(), "hotel").unwrap();
    let other = ExperimentTracker::new(dir.path(), "other").unwrap();
    let again = ExperimentTracker::new(dir.path(), "hotel").unwrap();

    assert_eq!(first.experiment_id(), "1");
    assert_eq!(other.experiment_id(), "2");
    assert_eq!(again.experiment_id(), first.experiment_id());
    assert_eq!(again.experiment_name(), "hotel");
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[test]
fn test_run_lifecycle() {
    let dir = TempDir::new().unwrap();
    let tracker = ExperimentTracker::new(dir.path(), "Default").unwrap();

    let mut run = tracker.start_run(Some("baseline")).unwrap();
    let run_id = run.run_id().to_string();
    assert_eq!(run.info().status(), Some(RunStatus::Running));

    run.log_param("learning_rate", "0.1").unwrap();
    run.log_metric("loss", 0.7, 0).unwrap();
    run.log_metric("loss", 0.4, 1).unwrap();
    run.finish().unwrap();

    let record = tracker.load_run(&run_id).unwrap();
    assert_eq!(record.info.status(), Some(RunStatus::Finished));
    assert!(record.info.end_time.is_some());
    assert_eq!(record.info.run_name, "baseline");
    assert_eq!(record.params["learning_rate"], "0.1");
    assert_eq!(record.tags["mlflow.runName"], "baseline");
    assert_eq!(record.metrics["loss"].len(), 2);
    assert_eq!(record.latest_metric("loss"), Some(0.4));
}

#[test]
fn test_dropped_run_is_failed() {
    let dir = TempDir::new().unwrap();
    let tracker = ExperimentTracker::new(dir.path(), "Default").unwrap();

    let run_id = {
        let run = tracker.start_run(None).unwrap();
        run.run_id().to_string()
    };

    let record = tracker.load_run(&run_id).unwrap();
    assert_eq!(record.info.status(), Some(RunStatus::Failed));
    assert!(record.info.run_name.starts_with("run-"));
}

#[test]
fn test_param_is_write_once() {
    let dir = TempDir::new().unwrap();
    let tracker = ExperimentTracker::new(dir.path(), "Default").unwrap();
    let mut run = tracker.start_run(None).unwrap();

    run.log_param("num_leaves", "31").unwrap();
    run.log_param("num_leaves", "31").unwrap();
    let err = run.log_param("num_leaves", "63").unwrap_err();
    assert_eq!(err.error_code(), "TRACKING_ERROR");
    run.finish().unwrap();
}

#[test]
fn test_log_params_unquotes_strings() {
    let dir = TempDir::new().unwrap();
    let tracker = ExperimentTracker::new(dir.path(), "Default").unwrap();
    let mut run = tracker.start_run(None).unwrap();
    let run_id = run.run_id().to_string();

    let params = BTreeMap::from([
        ("boosting_type".to_string(), serde_json::json!("gbdt")),
        ("max_depth".to_string(), serde_json::json!(-1)),
    ]);
    run.log_params(&params).unwrap();
    run.finish().unwrap();

    let record = tracker.load_run(&run_id).unwrap();
    assert_eq!(record.params["boosting_type"], "gbdt");
    assert_eq!(record.params["max_depth"], "-1");
}

#[test]
fn test_invalid_keys_rejected() {
    let dir = TempDir::new().unwrap();
    let tracker = ExperimentTracker::new(dir.path(), "Default").unwrap();
    let mut run = tracker.start_run(None).unwrap();

    for key in ["", "/abs", "../escape", "a/../b"] {
        assert!(run.set_tag(key, "x").is_err(), "key {key:?} accepted");
    }
    run.finish().unwrap();
}

#[test]
fn test_log_artifact_copies_file() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("model.json");
    fs::write(&source, "{}").unwrap();

    let tracker = ExperimentTracker::new(dir.path().join("mlruns"), "Default").unwrap();
    let mut run = tracker.start_run(None).unwrap();

    let stored = run.log_artifact(&source, Some("models")).unwrap();
    assert!(stored.ends_with("artifacts/models/model.json"));
    assert_eq!(fs::read_to_string(&stored).unwrap(), "{}");

    let err = run
        .log_artifact(dir.path().join("missing.csv"), None)
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
    run.finish().unwrap();
}

#[test]
fn test_list_runs() {
    let dir = TempDir::new().unwrap();
    let tracker = ExperimentTracker::new(dir.path(), "Default").unwrap();
    for name in ["a", "b"] {
        tracker.start_run(Some(name)).unwrap().finish().unwrap();
    }

    let runs = tracker.list_runs().unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status() == Some(RunStatus::Finished)));
}

#[test]
fn test_load_unknown_run() {
    let dir = TempDir::new().unwrap();
    let tracker = ExperimentTracker::new(dir.path(), "Default").unwrap();
    let err = tracker.load_run("nope").unwrap_err();
    assert_eq!(err.error_code(), "TRACKING_ERROR");
}
