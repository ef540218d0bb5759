//! CLI entry point for the ingestion stage.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use reserva_common::{ARTIFACTS_DIR, ArtifactPaths, CONFIG_PATH, init_logging, read_config};
use reserva_processing::DataIngestion;
use reserva_processing::storage::{LocalObjectStore, ObjectStore};
#[cfg(feature = "gcs")]
use reserva_processing::storage::{GcsConfig, GcsObjectStore};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Download the raw reservations CSV and split it into train/test files",
    long_about = "Download the raw reservations CSV and split it into train/test files.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  GOOGLE_OAUTH_ACCESS_TOKEN    Bearer token for the bucket (anonymous if unset)\n  \
                  STORAGE_EMULATOR_HOST        Storage endpoint override\n\n\
                  EXAMPLES:\n  \
                  # Fetch from the configured GCS bucket\n  \
                  data-ingestion\n\n  \
                  # Read <root>/<bucket>/<object> from disk instead\n  \
                  data-ingestion --local-bucket-root ./buckets"
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

    let store = object_store(args.local_bucket_root)?;
    DataIngestion::new(&config, paths, store)?.run()?;
    Ok(())
}
