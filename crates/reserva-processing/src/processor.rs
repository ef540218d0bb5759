//! Preprocessing stage: raw train/test CSVs in, model-ready CSVs out.
//!
//! ```text
//! train.csv ─┐                                       ┌─ processed_train.csv
//!            ├─ drop id ─ dedupe ─ encode ─ skew ─ SMOTE ─ top-K features ─┤
//! test.csv ──┘        (encoder fit on train only)    └─ processed_test.csv
//! ```

use std::fs;
use std::path::Path;

use polars::prelude::*;
use reserva_common::{
    AppConfig, ArtifactPaths, DataProcessingConfig, ID_COLUMN, Result, TARGET_COLUMN,
    load_table, require_column, save_table, stage_scope,
};
use tracing::{debug, info};

use crate::balance::Smote;
use crate::encoding::CategoricalEncoder;
use crate::forest::ForestConfig;
use crate::selection::select_features;
use crate::skew::correct_skew;

/// Row and column counts of the written outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingSummary {
    pub train_shape: (usize, usize),
    pub test_shape: (usize, usize),
    pub selected_features: Vec<String>,
}

/// Cleans, balances, and selects features for the train/test splits.
pub struct DataProcessor {
    config: DataProcessingConfig,
    paths: ArtifactPaths,
}

impl DataProcessor {
    /// Create the stage, making sure the processed directory exists.
    pub fn new(config: &AppConfig, paths: ArtifactPaths) -> Result<Self> {
        if !paths.processed_dir.exists() {
            fs::create_dir_all(&paths.processed_dir)?;
            info!("Directory {} created", paths.processed_dir.display());
        }
        Ok(Self {
            config: config.data_processing.clone(),
            paths,
        })
    }

    /// Learn category codes from the training table.
    pub fn fit_encoder(&self, train: &DataFrame) -> Result<CategoricalEncoder> {
        stage_scope("Error while fitting the label encoder", || {
            CategoricalEncoder::fit(train, &self.config.categorical_features)
        })
    }

    /// Drop the identifier, deduplicate, encode categoricals, and correct skew.
    pub fn preprocess(&self, df: DataFrame, encoder: &CategoricalEncoder) -> Result<DataFrame> {
        stage_scope("Error while data pre-processing", || {
            info!("Starting data preprocessing");
            let df = drop_identifier_and_duplicates(df)?;

            info!("Starting label encoding");
            let df = encoder.transform(df)?;

            info!("Skewness handling started");
            let df = correct_skew(
                df,
                &self.config.numerical_features,
                self.config.skewness_threshold,
            )?;
            info!("Data preprocessing completed");
            Ok(df)
        })
    }

    /// Oversample minority classes and checkpoint the result to `checkpoint`.
    pub fn balance(&self, df: DataFrame, checkpoint: &Path) -> Result<DataFrame> {
        stage_scope("Error while data balancing", || {
            info!("Starting data balancing");
            let smote = Smote::new(self.config.smote_k_neighbors, self.config.random_state);
            let mut balanced = smote.fit_resample(&df, TARGET_COLUMN)?;
            save_table(&mut balanced, checkpoint)?;
            info!("Data balancing completed");
            Ok(balanced)
        })
    }

    /// Keep the configured number of most important features plus the target.
    pub fn select_features(&self, df: DataFrame) -> Result<DataFrame> {
        stage_scope("Error while feature selection", || {
            info!("Starting feature selection");
            let selected = select_features(
                &df,
                TARGET_COLUMN,
                self.config.no_of_features,
                &self.forest_config(),
            )?;
            info!("Feature selection completed");
            Ok(selected)
        })
    }

    /// Write a table to `path`.
    pub fn save(&self, df: &mut DataFrame, path: &Path) -> Result<()> {
        stage_scope("Error while saving data", || save_table(df, path))
    }

    /// Run the whole stage over the raw split files.
    pub fn process(&self) -> Result<ProcessingSummary> {
        stage_scope("Error while data processing", || {
            info!("Loading data from RAW files");
            let train = load_table(&self.paths.train_file)?;
            let test = load_table(&self.paths.test_file)?;

            let encoder = self.fit_encoder(&train)?;
            let train = self.preprocess(train, &encoder)?;
            let test = self.preprocess(test, &encoder)?;

            let train = self.balance(train, &self.paths.balanced_train)?;
            let test = if self.config.balance_test_set {
                self.balance(test, &self.paths.balanced_test)?
            } else {
                debug!("Leaving the test split unbalanced");
                test
            };

            let mut train = self.select_features(train)?;
            let selected: Vec<String> = train
                .get_column_names()
                .into_iter()
                .map(|c| c.to_string())
                .collect();
            for column in &selected {
                require_column(&test, column)?;
            }
            let mut test = test.select(selected.iter().map(String::as_str))?;

            self.save(&mut train, &self.paths.processed_train)?;
            self.save(&mut test, &self.paths.processed_test)?;
            info!("Data processing completed");

            Ok(ProcessingSummary {
                train_shape: train.shape(),
                test_shape: test.shape(),
                selected_features: selected
                    .into_iter()
                    .filter(|c| c != TARGET_COLUMN)
                    .collect(),
            })
        })
    }

    fn forest_config(&self) -> ForestConfig {
        ForestConfig {
            n_estimators: self.config.forest_estimators,
            seed: self.config.random_state,
            ..ForestConfig::default()
        }
    }
}

/// Remove the identifier column (if still present) and duplicate rows,
/// keeping the first occurrence of each.
///
/// Running this on its own output changes nothing.
pub fn drop_identifier_and_duplicates(df: DataFrame) -> Result<DataFrame> {
    let df = if require_column(&df, ID_COLUMN).is_ok() {
        df.drop(ID_COLUMN)?
    } else {
        debug!("'{}' already dropped", ID_COLUMN);
        df
    };

    let before = df.height();
    let df = df
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    let removed = before - df.height();
    if removed > 0 {
        debug!("Removed {} duplicate rows", removed);
    }
    Ok(df)
}

/// Remove the identifier column; it must be present.
pub fn drop_identifier(df: DataFrame) -> Result<DataFrame> {
    require_column(&df, ID_COLUMN)?;
    Ok(df.drop(ID_COLUMN)?)
}
