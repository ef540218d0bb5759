//! Error types shared by every pipeline stage.
//!
//! `PipelineError` is the single domain error. Stage operations run inside
//! [`stage_scope`], which logs a failure and wraps it with the stage's
//! context before handing it back to the caller.

use std::path::PathBuf;

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the training pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// File does not exist (or is not a regular file).
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// File exists but cannot be opened for reading.
    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// File could be opened but not parsed as a table.
    #[error("Failed to load table from {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: polars::error::PolarsError,
    },

    /// Invalid configuration or argument.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Data does not satisfy a stage's preconditions.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Object store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Experiment tracker failure.
    #[error("Tracking error: {0}")]
    Tracking(String),

    /// Model fitting or search failure.
    #[error("Training failed: {0}")]
    Training(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request error (object store client, only with "http" feature).
    #[cfg(feature = "http")]
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code, looking through any context wrappers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::Load { .. } => "LOAD_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Tracking(_) => "TRACKING_ERROR",
            Self::Training(_) => "TRAINING_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Yaml(_) => "YAML_ERROR",
            #[cfg(feature = "http")]
            Self::Http(_) => "HTTP_REQUEST_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// The innermost error, with every context layer removed.
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Errors are serialized as `{code, message}`; failed tracking runs store this as a tag.
impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

/// Run a stage operation, logging and wrapping any failure with `context`.
///
/// ```rust,ignore
/// stage_scope("Error while splitting data", || {
///     let df = load_table(&paths.raw_file)?;
///     Ok(df.height())
/// })?;
/// ```
pub fn stage_scope<T, F>(context: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    f().map_err(|e| {
        tracing::error!("{}: {}", context, e);
        e.with_context(context)
    })
}
