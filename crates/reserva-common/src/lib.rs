//! Shared building blocks for the reservation cancellation pipeline.
//!
//! Every stage (ingestion, preprocessing, training) depends on this crate for:
//!
//! - **Configuration**: [`AppConfig`] parsed from `config/config.yaml` and validated
//! - **Artifact layout**: [`ArtifactPaths`], built once per process and passed down
//! - **Table IO**: [`load_table`] / [`save_table`] over polars `DataFrame`s
//! - **Errors**: [`PipelineError`], [`ResultExt`], and the [`stage_scope`] helper
//! - **Logging**: [`init_logging`] for the binaries
//!
//! # Example
//!
//! ```rust,ignore
//! use reserva_common::{ArtifactPaths, load_table, read_config};
//!
//! let config = read_config("config/config.yaml")?;
//! let paths = ArtifactPaths::default();
//! let train = load_table(&paths.train_file)?;
//! println!("{} training rows", train.height());
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;
pub mod table;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Label column predicted by the model.
pub const TARGET_COLUMN: &str = "booking_status";

/// Per-row identifier dropped before modelling.
pub const ID_COLUMN: &str = "Booking_ID";

// Re-exports for convenient access
pub use config::{
    AppConfig, ConfigValidationError, DataIngestionConfig, DataProcessingConfig,
    ModelTrainingConfig, ParamDistribution, ParamValue, RandomSearchConfig, read_config,
};
pub use error::{PipelineError, Result, ResultExt, stage_scope};
pub use logging::init_logging;
pub use paths::{ARTIFACTS_DIR, ArtifactPaths, CONFIG_PATH};
pub use table::{column_as_f64, feature_names, load_table, require_column, save_table};

static_assertions::assert_impl_all!(PipelineError: Send, Sync);
static_assertions::assert_impl_all!(AppConfig: Send, Sync);
