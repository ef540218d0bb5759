//! CLI entry point for the preprocessing stage.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use reserva_common::{ARTIFACTS_DIR, ArtifactPaths, CONFIG_PATH, init_logging, read_config};
use reserva_processing::DataProcessor;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Clean, balance, and select features for the train/test splits"
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

    let summary = DataProcessor::new(&config, paths)?.process()?;
    info!(
        "Processed train {:?}, test {:?}; features: {}",
        summary.train_shape,
        summary.test_shape,
        summary.selected_features.join(", ")
    );
    Ok(())
}
