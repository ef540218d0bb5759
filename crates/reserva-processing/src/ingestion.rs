//! Ingestion stage: fetch the raw CSV and split it into train/test files.

use std::fs;
use std::sync::Arc;

use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use reserva_common::{
    AppConfig, ArtifactPaths, DataIngestionConfig, PipelineError, Result, load_table, save_table,
    stage_scope,
};
use tracing::info;

use crate::storage::ObjectStore;

/// Seed for the train/test shuffle.
pub const SPLIT_SEED: u64 = 42;

/// Downloads the raw dataset and writes the train/test split.
pub struct DataIngestion {
    config: DataIngestionConfig,
    paths: ArtifactPaths,
    store: Arc<dyn ObjectStore>,
}

impl DataIngestion {
    /// Create the stage, making sure the raw directory exists.
    pub fn new(config: &AppConfig, paths: ArtifactPaths, store: Arc<dyn ObjectStore>) -> Result<Self> {
        fs::create_dir_all(&paths.raw_dir)?;
        let config = config.data_ingestion.clone();
        info!(
            "Data ingestion started with bucket {} and file {} (store: {})",
            config.bucket_name,
            config.bucket_file_name,
            store.name()
        );
        Ok(Self {
            config,
            paths,
            store,
        })
    }

    /// Fetch the configured object to the raw file path.
    pub fn download_raw(&self) -> Result<u64> {
        stage_scope("Failed to download the CSV", || {
            let bytes = self.store.download(
                &self.config.bucket_name,
                &self.config.bucket_file_name,
                &self.paths.raw_file,
            )?;
            info!(
                "CSV file downloaded from bucket {} to {}",
                self.config.bucket_name,
                self.paths.raw_file.display()
            );
            Ok(bytes)
        })
    }

    /// Split the raw file into train/test CSVs, returning their row counts.
    pub fn split_data(&self, ratio: f64) -> Result<(usize, usize)> {
        stage_scope("Failed to split the data", || {
            info!("Starting the data splitting process");
            let df = load_table(&self.paths.raw_file)?;
            let (mut train, mut test) = split_frame(&df, ratio, SPLIT_SEED)?;

            save_table(&mut train, &self.paths.train_file)?;
            save_table(&mut test, &self.paths.test_file)?;

            info!(
                "Data split into {} train and {} test rows",
                train.height(),
                test.height()
            );
            Ok((train.height(), test.height()))
        })
    }

    /// Download, then split with the configured ratio.
    pub fn run(&self) -> Result<()> {
        stage_scope("Failed to run the data ingestion", || {
            info!("Data ingestion started");
            self.download_raw()?;
            self.split_data(self.config.train_size)?;
            info!("Data ingestion completed");
            Ok(())
        })
    }
}

/// Shuffle the rows of `df` with `seed` and cut the first `round(ratio * n)`
/// off as the train split.
pub fn split_frame(df: &DataFrame, ratio: f64, seed: u64) -> Result<(DataFrame, DataFrame)> {
    if !(ratio > 0.0 && ratio < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "train ratio must be strictly between 0 and 1, got {ratio}"
        )));
    }

    let n = df.height();
    let n_train = (ratio * n as f64).round() as usize;
    if n_train == 0 || n_train == n {
        return Err(PipelineError::InvalidData(format!(
            "a {ratio} split of {n} rows leaves one side empty"
        )));
    }

    let mut indices: Vec<IdxSize> = (0..n as IdxSize).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_idx = indices.split_off(n_train);
    let train = df.take(&IdxCa::from_vec("idx".into(), indices))?;
    let test = df.take(&IdxCa::from_vec("idx".into(), test_idx))?;
    Ok((train, test))
}
