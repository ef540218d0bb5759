use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use reserva_common::{PipelineError, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{META_FILE, RunInfo, RunStatus, file_uri, now_millis, read_yaml, write_yaml};

const RUN_NAME_TAG: &str = "mlflow.runName";

/// A run in progress.
///
/// Dropping a run that was never finished marks it `FAILED`.
#[derive(Debug)]
pub struct ActiveRun {
    dir: PathBuf,
    info: RunInfo,
    closed: bool,
}

impl ActiveRun {
    pub(super) fn start(
        experiment_dir: &Path,
        experiment_id: &str,
        run_name: Option<&str>,
    ) -> Result<Self> {
        let run_id = Uuid::new_v4().simple().to_string();
        let dir = experiment_dir.join(&run_id);
        for sub in ["params", "metrics", "tags", "artifacts"] {
            fs::create_dir_all(dir.join(sub))?;
        }

        let run_name = run_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("run-{}", &run_id[..8]));
        let info = RunInfo {
            artifact_uri: file_uri(&dir.join("artifacts")),
            end_time: None,
            experiment_id: experiment_id.to_string(),
            lifecycle_stage: "active".to_string(),
            run_id: run_id.clone(),
            run_name: run_name.clone(),
            run_uuid: run_id,
            start_time: now_millis(),
            status: RunStatus::Running.code(),
            user_id: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
        };
        write_yaml(&dir.join(META_FILE), &info)?;

        let mut run = Self {
            dir,
            info,
            closed: false,
        };
        run.set_tag(RUN_NAME_TAG, &run_name)?;
        info!("Started run '{}' ({})", run_name, run.info.run_id);
        Ok(run)
    }

    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.dir.join("artifacts")
    }

    /// Record a parameter. Params are write-once: logging the same key with a
    /// different value fails.
    pub fn log_param(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path("params", key)?;
        if path.is_file() {
            let existing = fs::read_to_string(&path)?;
            if existing != value {
                return Err(PipelineError::Tracking(format!(
                    "param '{key}' already logged as '{existing}', refusing '{value}'"
                )));
            }
            return Ok(());
        }
        write_key_file(&path, value)
    }

    /// Record a map of parameters; strings are stored unquoted, everything
    /// else as JSON.
    pub fn log_params(&mut self, params: &BTreeMap<String, serde_json::Value>) -> Result<()> {
        for (key, value) in params {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.log_param(key, &text)?;
        }
        Ok(())
    }

    /// Append one value to a metric's history.
    pub fn log_metric(&mut self, key: &str, value: f64, step: i64) -> Result<()> {
        let path = self.key_path("metrics", key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{} {} {}", now_millis(), value, step)?;
        debug!("metric {} = {} (step {})", key, value, step);
        Ok(())
    }

    pub fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<()> {
        for (key, value) in metrics {
            self.log_metric(key, *value, 0)?;
        }
        Ok(())
    }

    /// Set a tag; later values overwrite earlier ones.
    pub fn set_tag(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path("tags", key)?;
        write_key_file(&path, value)
    }

    /// Copy a file into the run's artifacts, optionally under a subdirectory.
    /// Returns the stored path.
    pub fn log_artifact(&mut self, source: impl AsRef<Path>, artifact_path: Option<&str>) -> Result<PathBuf> {
        let source = source.as_ref();
        if !source.is_file() {
            return Err(PipelineError::NotFound(source.to_path_buf()));
        }
        let file_name = source
            .file_name()
            .ok_or_else(|| PipelineError::NotFound(source.to_path_buf()))?;

        let mut target_dir = self.artifacts_dir();
        if let Some(sub) = artifact_path {
            validate_key(sub)?;
            target_dir = target_dir.join(sub);
        }
        fs::create_dir_all(&target_dir)?;

        let target = target_dir.join(file_name);
        fs::copy(source, &target)?;
        debug!("Logged artifact {} -> {}", source.display(), target.display());
        Ok(target)
    }

    /// Mark the run `FINISHED`.
    pub fn finish(mut self) -> Result<()> {
        self.close(RunStatus::Finished)
    }

    /// Mark the run `FAILED`.
    pub fn fail(mut self) -> Result<()> {
        self.close(RunStatus::Failed)
    }

    fn close(&mut self, status: RunStatus) -> Result<()> {
        self.closed = true;
        let meta_path = self.dir.join(META_FILE);
        let mut info: RunInfo = read_yaml(&meta_path)?;
        info.status = status.code();
        info.end_time = Some(now_millis());
        write_yaml(&meta_path, &info)?;
        info!("Run {} ended with status {:?}", info.run_id, status);
        self.info = info;
        Ok(())
    }

    fn key_path(&self, kind: &str, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(kind).join(key))
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        warn!("Run {} dropped without finishing; marking it failed", self.info.run_id);
        if let Err(e) = self.close(RunStatus::Failed) {
            warn!("Could not close run {}: {}", self.info.run_id, e);
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
        return Err(PipelineError::Tracking(format!("invalid key '{key}'")));
    }
    Ok(())
}

fn write_key_file(path: &Path, value: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, value)?;
    Ok(())
}
