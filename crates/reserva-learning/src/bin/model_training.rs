//! CLI entry point for the training stage.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use reserva_common::{ARTIFACTS_DIR, ArtifactPaths, CONFIG_PATH, init_logging, read_config};
use reserva_learning::ModelTraining;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Tune, evaluate, and save the cancellation model",
    long_about = "Tune, evaluate, and save the cancellation model.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  MLFLOW_TRACKING_URI    file: URI or directory for the run store \
                  (defaults to model_training.tracking_dir)"
)]
struct Args {
    /// Path to the YAML configuration
    #[arg(short, long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Artifact root directory
    #[arg(short, long, default_value = ARTIFACTS_DIR)]
    artifacts: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    dotenv().ok();
    init_logging(&args.log_level);

    let config = read_config(&args.config)?;
    let paths = ArtifactPaths::new(&args.artifacts);

    let metrics = ModelTraining::new(&config, paths).run()?;
    info!("Test metrics: {}", serde_json::to_string(&metrics)?);
    Ok(())
}
