//! Ingestion and preprocessing stages of the reservation cancellation pipeline.
//!
//! # Overview
//!
//! - **Ingestion**: [`DataIngestion`] fetches the raw CSV through an
//!   [`storage::ObjectStore`] and writes a seeded train/test split
//! - **Preprocessing**: [`DataProcessor`] drops the identifier, removes
//!   duplicates, label-encodes categoricals, corrects skew, balances classes
//!   with SMOTE, and keeps the top-K features ranked by a random forest
//!
//! Both stages read their settings from [`reserva_common::AppConfig`] and
//! their file locations from [`reserva_common::ArtifactPaths`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use reserva_common::{ArtifactPaths, read_config};
//! use reserva_processing::{DataIngestion, DataProcessor};
//! use reserva_processing::storage::GcsObjectStore;
//!
//! let config = read_config("config/config.yaml")?;
//! let paths = ArtifactPaths::default();
//!
//! let store = Arc::new(GcsObjectStore::new()?);
//! DataIngestion::new(&config, paths.clone(), store)?.run()?;
//!
//! let summary = DataProcessor::new(&config, paths)?.process()?;
//! println!("Selected: {:?}", summary.selected_features);
//! ```
//!
//! # Building blocks
//!
//! Each preprocessing step is usable on its own:
//!
//! - [`encoding::CategoricalEncoder`] - sorted-class label encoding
//! - [`skew::correct_skew`] - `log1p`/`expm1` on skewed numerical columns
//! - [`balance::Smote`] - synthetic minority oversampling
//! - [`forest::RandomForest`] / [`selection::select_features`] - importance ranking

pub mod balance;
pub mod encoding;
pub mod forest;
pub mod ingestion;
pub mod processor;
pub mod selection;
pub mod skew;
pub mod storage;

// Re-exports for convenient access
pub use balance::Smote;
pub use encoding::CategoricalEncoder;
pub use forest::{ForestConfig, RandomForest};
pub use ingestion::{DataIngestion, SPLIT_SEED, split_frame};
pub use processor::{DataProcessor, ProcessingSummary, drop_identifier_and_duplicates};
pub use selection::{FeatureImportance, rank_features, select_features};
pub use skew::{SkewTransform, correct_skew, skewness};
pub use storage::{LocalObjectStore, ObjectStore};

static_assertions::assert_impl_all!(DataIngestion: Send, Sync);
static_assertions::assert_impl_all!(DataProcessor: Send, Sync);
static_assertions::assert_impl_all!(RandomForest: Send, Sync);
