//! Runs ingestion, preprocessing, and training in order.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use reserva_common::{ARTIFACTS_DIR, ArtifactPaths, CONFIG_PATH, init_logging, read_config};
use reserva_learning::ModelTraining;
use reserva_processing::storage::{LocalObjectStore, ObjectStore};
#[cfg(feature = "gcs")]
use reserva_processing::storage::{GcsConfig, GcsObjectStore};
use reserva_processing::{DataIngestion, DataProcessor};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Run the full pipeline: ingestion, preprocessing, training",
    long_about = "Run the full pipeline: ingestion, preprocessing, training.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  GOOGLE_OAUTH_ACCESS_TOKEN    Bearer token for the bucket (anonymous if unset)\n  \
                  STORAGE_EMULATOR_HOST        Storage endpoint override\n  \
                  MLFLOW_TRACKING_URI          file: URI or directory for the run store\n\n\
                  EXAMPLES:\n  \
                  training-pipeline\n  \
                  training-pipeline --local-bucket-root ./buckets --log-level debug"
)]
struct Args {
    /// Path to the YAML configuration
    #[arg(short, long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Artifact root directory
    #[arg(short, long, default_value = ARTIFACTS_DIR)]
    artifacts: PathBuf,

    /// Serve buckets from this directory instead of Cloud Storage
    #[arg(long)]
    local_bucket_root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn object_store(local_root: Option<PathBuf>) -> Result<Arc<dyn ObjectStore>> {
    if let Some(root) = local_root {
        info!("Reading buckets from {}", root.display());
        return Ok(Arc::new(LocalObjectStore::new(root)));
    }

    #[cfg(feature = "gcs")]
    return Ok(Arc::new(GcsObjectStore::with_config(GcsConfig::from_env())?));

    #[cfg(not(feature = "gcs"))]
    return Err(anyhow::anyhow!("built without the `gcs` feature; pass --local-bucket-root"));
}

fn main() -> Result<()> {
    let args = Args::parse();

    dotenv().ok();
    init_logging(&args.log_level);

    let config = read_config(&args.config)?;
    let paths = ArtifactPaths::new(&args.artifacts);

    info!("[1/3] Data ingestion");
    let store = object_store(args.local_bucket_root)?;
    DataIngestion::new(&config, paths.clone(), store)?.run()?;

    info!("[2/3] Data processing");
    let summary = DataProcessor::new(&config, paths.clone())?.process()?;
    info!(
        "Selected features: {}",
        summary.selected_features.join(", ")
    );

    info!("[3/3] Model training");
    let metrics = ModelTraining::new(&config, paths).run()?;
    info!("Test metrics: {}", serde_json::to_string(&metrics)?);
    Ok(())
}
