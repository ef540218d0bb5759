//! Typed pipeline configuration, parsed from `config/config.yaml`.
//!
//! The file has one section per stage. `data_ingestion` and `data_processing`
//! are required; `model_training` falls back to the stock search settings
//! when it is omitted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

/// Scoring names accepted by the hyperparameter search.
pub const SCORING_METRICS: &[&str] = &["accuracy", "f1", "precision", "recall", "roc_auc"];

/// Root configuration for all pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub data_ingestion: DataIngestionConfig,
    pub data_processing: DataProcessingConfig,
    #[serde(default)]
    pub model_training: ModelTrainingConfig,
}

/// Where the raw dataset lives and how to split it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataIngestionConfig {
    pub bucket_name: String,
    pub bucket_file_name: String,
    /// Fraction of rows that go to the train split, strictly between 0 and 1.
    pub train_size: f64,
}

/// Cleaning, balancing, and feature selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataProcessingConfig {
    /// Columns to label-encode, in order.
    pub categorical_features: Vec<String>,
    /// Columns checked for skew.
    pub numerical_features: Vec<String>,
    pub skewness_threshold: f64,
    /// How many features survive selection (the target is kept on top of these).
    pub no_of_features: usize,

    /// Oversample the test split as well as the train split.
    #[serde(default = "default_true")]
    pub balance_test_set: bool,

    #[serde(default = "default_smote_k_neighbors")]
    pub smote_k_neighbors: usize,

    /// Trees in the feature-ranking forest.
    #[serde(default = "default_forest_estimators")]
    pub forest_estimators: usize,

    /// Seed for SMOTE and the feature-ranking forest.
    #[serde(default = "default_random_state")]
    pub random_state: u64,
}

/// Randomized search settings and tracker location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTrainingConfig {
    #[serde(default)]
    pub random_search: RandomSearchConfig,
    #[serde(default = "default_param_distributions")]
    pub param_distributions: BTreeMap<String, ParamDistribution>,
    #[serde(default = "default_experiment_name")]
    pub experiment_name: String,
    #[serde(default = "default_tracking_dir")]
    pub tracking_dir: PathBuf,
}

impl Default for ModelTrainingConfig {
    fn default() -> Self {
        Self {
            random_search: RandomSearchConfig::default(),
            param_distributions: default_param_distributions(),
            experiment_name: default_experiment_name(),
            tracking_dir: default_tracking_dir(),
        }
    }
}

impl ModelTrainingConfig {
    /// Tracker root, honouring `MLFLOW_TRACKING_URI` when it is set.
    pub fn tracking_root(&self) -> PathBuf {
        resolve_tracking_root(
            std::env::var("MLFLOW_TRACKING_URI").ok().as_deref(),
            &self.tracking_dir,
        )
    }
}

/// `file:` URIs and plain paths win over the configured directory; remote
/// tracking servers are not supported and fall back to it.
pub fn resolve_tracking_root(uri: Option<&str>, fallback: &Path) -> PathBuf {
    match uri.map(str::trim) {
        None | Some("") => fallback.to_path_buf(),
        Some(uri) => {
            if let Some(rest) = uri.strip_prefix("file://") {
                PathBuf::from(rest)
            } else if let Some(rest) = uri.strip_prefix("file:") {
                PathBuf::from(rest)
            } else if uri.contains("://") {
                warn!(
                    "Remote tracking URI '{}' is not supported, using {}",
                    uri,
                    fallback.display()
                );
                fallback.to_path_buf()
            } else {
                PathBuf::from(uri)
            }
        }
    }
}

/// Cross-validated search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomSearchConfig {
    /// Parameter settings sampled.
    pub n_iter: usize,
    /// Folds per setting.
    pub cv: usize,
    /// 0 = quiet, 1 = per-candidate, 2 = per-fold.
    pub verbose: u8,
    /// Worker threads; -1 means all cores.
    pub n_jobs: i32,
    pub random_state: u64,
    pub scoring: String,
}

impl Default for RandomSearchConfig {
    fn default() -> Self {
        Self {
            n_iter: 4,
            cv: 2,
            verbose: 2,
            n_jobs: -1,
            random_state: 42,
            scoring: "accuracy".to_string(),
        }
    }
}

/// Sampling distribution for one hyperparameter.
///
/// Written in YAML as a single-key map, e.g. `{randint: [100, 500]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DistributionSpec", into = "DistributionSpec")]
pub enum ParamDistribution {
    /// Integers in `[low, high)`.
    Randint(i64, i64),
    /// Floats in `[loc, loc + scale]`.
    Uniform(f64, f64),
    /// One of the listed values, uniformly.
    Choice(Vec<ParamValue>),
}

/// On-disk form of [`ParamDistribution`]: exactly one key must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DistributionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    randint: Option<(i64, i64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uniform: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    choice: Option<Vec<ParamValue>>,
}

impl TryFrom<DistributionSpec> for ParamDistribution {
    type Error = String;

    fn try_from(spec: DistributionSpec) -> std::result::Result<Self, Self::Error> {
        match (spec.randint, spec.uniform, spec.choice) {
            (Some((low, high)), None, None) => Ok(Self::Randint(low, high)),
            (None, Some((loc, scale)), None) => Ok(Self::Uniform(loc, scale)),
            (None, None, Some(values)) => Ok(Self::Choice(values)),
            _ => Err("expected exactly one of randint, uniform, choice".to_string()),
        }
    }
}

impl From<ParamDistribution> for DistributionSpec {
    fn from(distribution: ParamDistribution) -> Self {
        match distribution {
            ParamDistribution::Randint(low, high) => Self {
                randint: Some((low, high)),
                ..Self::default()
            },
            ParamDistribution::Uniform(loc, scale) => Self {
                uniform: Some((loc, scale)),
                ..Self::default()
            },
            ParamDistribution::Choice(values) => Self {
                choice: Some(values),
                ..Self::default()
            },
        }
    }
}

/// A concrete hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::from(*b),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Value::from(*v),
            Self::Str(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_smote_k_neighbors() -> usize {
    5
}

fn default_forest_estimators() -> usize {
    100
}

fn default_random_state() -> u64 {
    42
}

fn default_experiment_name() -> String {
    "Default".to_string()
}

fn default_tracking_dir() -> PathBuf {
    PathBuf::from("mlruns")
}

/// The stock LightGBM search space.
pub fn default_param_distributions() -> BTreeMap<String, ParamDistribution> {
    BTreeMap::from([
        ("n_estimators".to_string(), ParamDistribution::Randint(100, 500)),
        ("max_depth".to_string(), ParamDistribution::Randint(5, 50)),
        ("learning_rate".to_string(), ParamDistribution::Uniform(0.01, 0.2)),
        ("num_leaves".to_string(), ParamDistribution::Randint(20, 100)),
        (
            "boosting_type".to_string(),
            ParamDistribution::Choice(vec![ParamValue::Str("gbdt".to_string())]),
        ),
    ])
}

impl AppConfig {
    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        let ingestion = &self.data_ingestion;
        if !(ingestion.train_size > 0.0 && ingestion.train_size < 1.0) {
            return Err(ConfigValidationError::InvalidTrainSize(ingestion.train_size));
        }
        if ingestion.bucket_name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyField("data_ingestion.bucket_name"));
        }
        if ingestion.bucket_file_name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyField(
                "data_ingestion.bucket_file_name",
            ));
        }

        let processing = &self.data_processing;
        if processing.no_of_features == 0 {
            return Err(ConfigValidationError::AtLeastOne("data_processing.no_of_features"));
        }
        if processing.smote_k_neighbors == 0 {
            return Err(ConfigValidationError::AtLeastOne(
                "data_processing.smote_k_neighbors",
            ));
        }
        if processing.forest_estimators == 0 {
            return Err(ConfigValidationError::AtLeastOne(
                "data_processing.forest_estimators",
            ));
        }
        if processing.skewness_threshold.is_nan() {
            return Err(ConfigValidationError::EmptyField(
                "data_processing.skewness_threshold",
            ));
        }

        let search = &self.model_training.random_search;
        if search.n_iter == 0 {
            return Err(ConfigValidationError::AtLeastOne("random_search.n_iter"));
        }
        if search.cv < 2 {
            return Err(ConfigValidationError::InvalidFolds(search.cv));
        }
        if search.n_jobs == 0 || search.n_jobs < -1 {
            return Err(ConfigValidationError::InvalidJobs(search.n_jobs));
        }
        if !SCORING_METRICS.contains(&search.scoring.as_str()) {
            return Err(ConfigValidationError::UnknownScoring(search.scoring.clone()));
        }

        for (name, distribution) in &self.model_training.param_distributions {
            let valid = match distribution {
                ParamDistribution::Randint(low, high) => low < high,
                ParamDistribution::Uniform(loc, scale) => loc.is_finite() && *scale >= 0.0,
                ParamDistribution::Choice(values) => !values.is_empty(),
            };
            if !valid {
                return Err(ConfigValidationError::InvalidDistribution(name.clone()));
            }
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid train_size: {0} (must be strictly between 0.0 and 1.0)")]
    InvalidTrainSize(f64),

    #[error("'{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("'{0}' must be at least 1")]
    AtLeastOne(&'static str),

    #[error("Invalid number of folds: {0} (must be at least 2)")]
    InvalidFolds(usize),

    #[error("Invalid n_jobs: {0} (must be -1 or a positive count)")]
    InvalidJobs(i32),

    #[error("Unknown scoring '{0}' (expected one of accuracy, f1, precision, recall, roc_auc)")]
    UnknownScoring(String),

    #[error("Empty or inverted distribution for parameter '{0}'")]
    InvalidDistribution(String),
}

impl From<ConfigValidationError> for PipelineError {
    fn from(err: ConfigValidationError) -> Self {
        PipelineError::InvalidConfig(err.to_string())
    }
}

/// Read and validate the YAML configuration at `path`.
pub fn read_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PipelineError::NotFound(path.to_path_buf()));
    }

    let text = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&text)?;
    config.validate()?;

    info!("Successfully read the YAML file {}", path.display());
    Ok(config)
}
