//! Model training for the reservation cancellation pipeline.
//!
//! - **Model**: [`GbdtClassifier`], a histogram gradient-boosted tree
//!   classifier with leaf-wise growth and a logistic objective
//! - **Search**: [`RandomizedSearch`] with stratified cross-validation on a
//!   `rayon` pool
//! - **Evaluation**: [`Metrics`] (accuracy, precision, recall, F1, ROC AUC)
//! - **Tracking**: [`ExperimentTracker`] writing an MLflow-compatible file store
//! - **Stage**: [`ModelTraining`] tying them together over the processed CSVs
//!
//! # Example
//!
//! ```rust,ignore
//! use reserva_common::{ArtifactPaths, read_config};
//! use reserva_learning::ModelTraining;
//!
//! let config = read_config("config/config.yaml")?;
//! let metrics = ModelTraining::new(&config, ArtifactPaths::default()).run()?;
//! println!("test accuracy {:.3}", metrics.accuracy);
//! ```

pub mod gbdt;
pub mod metrics;
pub mod search;
pub mod tracking;
pub mod training;

// Re-exports for convenient access
pub use gbdt::{GbdtClassifier, GbdtParams};
pub use metrics::{Metrics, Scoring};
pub use search::{CandidateResult, ParamSet, RandomizedSearch, SearchResult, stratified_folds};
pub use tracking::{ActiveRun, ExperimentTracker, RunInfo, RunRecord, RunStatus};
pub use training::{ModelTraining, SplitData};

static_assertions::assert_impl_all!(GbdtClassifier: Send, Sync);
static_assertions::assert_impl_all!(RandomizedSearch: Send, Sync);
static_assertions::assert_impl_all!(ModelTraining: Send, Sync);
