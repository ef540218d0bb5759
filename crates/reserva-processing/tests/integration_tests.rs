//! Integration tests for the ingestion and preprocessing stages.
//!
//! The raw CSV is generated, placed in a local bucket directory, and pulled
//! through the same code paths the binaries use.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use polars::prelude::*;
use pretty_assertions::assert_eq;
use reserva_common::testing::{sample_config, synthetic_reservations};
use reserva_common::{AppConfig, ArtifactPaths, TARGET_COLUMN, load_table, save_table};
use reserva_processing::storage::{LocalObjectStore, ObjectStore};
use reserva_processing::{DataIngestion, DataProcessor, drop_identifier_and_duplicates};

// ============================================================================
// Helpers
// ============================================================================

/// Write `n` synthetic reservations where `LocalObjectStore` will find them.
fn seed_bucket(bucket_root: &Path, config: &AppConfig, n: usize) {
    let mut raw = synthetic_reservations(n, 2024).unwrap();
    let object = bucket_root
        .join(&config.data_ingestion.bucket_name)
        .join(&config.data_ingestion.bucket_file_name);
    save_table(&mut raw, &object).unwrap();
}

fn ingest(root: &Path, config: &AppConfig, n: usize) -> ArtifactPaths {
    let buckets = root.join("buckets");
    seed_bucket(&buckets, config, n);

    let paths = ArtifactPaths::new(root.join("artifacts"));
    let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(&buckets));
    DataIngestion::new(config, paths.clone(), store)
        .unwrap()
        .run()
        .unwrap();
    paths
}

fn class_counts(df: &DataFrame) -> BTreeMap<i64, usize> {
    let mut counts = BTreeMap::new();
    let target = df
        .column(TARGET_COLUMN)
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::Int64)
        .unwrap();
    for value in target.i64().unwrap().into_no_null_iter() {
        *counts.entry(value).or_insert(0) += 1;
    }
    counts
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|c| c.to_string())
        .collect()
}

// ============================================================================
// Ingestion
// ============================================================================

#[test]
fn test_ingestion_splits_1000_rows_into_800_and_200() {
    let dir = tempfile::tempdir().unwrap();
    let config = sample_config();
    let paths = ingest(dir.path(), &config, 1000);

    let raw = load_table(&paths.raw_file).unwrap();
    let train = load_table(&paths.train_file).unwrap();
    let test = load_table(&paths.test_file).unwrap();

    assert_eq!(raw.height(), 1000);
    assert_eq!(train.height(), 800);
    assert_eq!(test.height(), 200);
    assert_eq!(column_names(&train), column_names(&raw));
}

#[test]
fn test_ingestion_missing_object_is_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = sample_config();
    let paths = ArtifactPaths::new(dir.path().join("artifacts"));
    let store = Arc::new(LocalObjectStore::new(dir.path().join("empty")));

    let err = DataIngestion::new(&config, paths, store)
        .unwrap()
        .run()
        .unwrap_err();

    assert_eq!(err.error_code(), "STORAGE_ERROR");
    assert!(err.to_string().starts_with("Failed to run the data ingestion"));
}

// ============================================================================
// Preprocessing
// ============================================================================

#[test]
fn test_processing_writes_top_k_plus_target() {
    let dir = tempfile::tempdir().unwrap();
    let config = sample_config();
    let paths = ingest(dir.path(), &config, 1000);

    let summary = DataProcessor::new(&config, paths.clone())
        .unwrap()
        .process()
        .unwrap();
    assert_eq!(summary.selected_features.len(), 10);

    let train = load_table(&paths.processed_train).unwrap();
    let test = load_table(&paths.processed_test).unwrap();
    assert_eq!(train.width(), 11);
    assert_eq!(test.width(), 11);
    assert_eq!(column_names(&train), column_names(&test));
    assert_eq!(column_names(&train).last().unwrap(), TARGET_COLUMN);
}

#[test]
fn test_processing_balances_both_splits() {
    let dir = tempfile::tempdir().unwrap();
    let config = sample_config();
    let paths = ingest(dir.path(), &config, 1000);

    DataProcessor::new(&config, paths.clone())
        .unwrap()
        .process()
        .unwrap();

    for path in [&paths.balanced_train, &paths.processed_train, &paths.processed_test] {
        let counts = class_counts(&load_table(path).unwrap());
        assert_eq!(counts.len(), 2, "{}", path.display());
        let sizes: Vec<usize> = counts.values().copied().collect();
        assert_eq!(sizes[0], sizes[1], "{}", path.display());
    }
}

#[test]
fn test_processing_can_leave_test_unbalanced() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sample_config();
    config.data_processing.balance_test_set = false;
    let paths = ingest(dir.path(), &config, 1000);

    let summary = DataProcessor::new(&config, paths.clone())
        .unwrap()
        .process()
        .unwrap();

    assert!(summary.test_shape.0 <= 200);
    assert!(!paths.balanced_test.exists());
}

#[test]
fn test_processing_without_raw_split_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::new(dir.path());

    let err = DataProcessor::new(&sample_config(), paths)
        .unwrap()
        .process()
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[test]
fn test_too_many_features_fails_processing() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sample_config();
    config.data_processing.no_of_features = 40;
    let paths = ingest(dir.path(), &config, 300);

    let err = DataProcessor::new(&config, paths)
        .unwrap()
        .process()
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_CONFIG");
}

#[test]
fn test_identifier_and_duplicate_removal_is_idempotent() {
    let raw = synthetic_reservations(200, 5).unwrap();
    let doubled = raw.vstack(&raw).unwrap();

    let once = drop_identifier_and_duplicates(doubled).unwrap();
    let twice = drop_identifier_and_duplicates(once.clone()).unwrap();

    assert_eq!(once.height(), 200);
    assert!(once.equals(&twice));
}
