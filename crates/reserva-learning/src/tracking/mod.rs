//! Experiment tracking on an MLflow-compatible file store.
//!
//! Layout under the tracking root:
//!
//! ```text
//! mlruns/
//! └── <experiment_id>/
//!     ├── meta.yaml
//!     └── <run_id>/
//!         ├── meta.yaml
//!         ├── params/<key>       value
//!         ├── metrics/<key>      "<timestamp_ms> <value> <step>" per line
//!         ├── tags/<key>         value
//!         └── artifacts/...
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use reserva_learning::tracking::ExperimentTracker;
//!
//! let tracker = ExperimentTracker::new("mlruns", "Default")?;
//! let mut run = tracker.start_run(Some("baseline"))?;
//! run.log_param("learning_rate", "0.1")?;
//! run.log_metric("accuracy", 0.91, 0)?;
//! run.finish()?;
//!
//! for info in tracker.list_runs()? {
//!     println!("{} {:?}", info.run_id, info.status());
//! }
//! ```

mod run;

#[cfg(test)]
mod tests;

pub use run::ActiveRun;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use reserva_common::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const META_FILE: &str = "meta.yaml";
const DEFAULT_EXPERIMENT: &str = "Default";

/// Lifecycle state of a run, stored as MLflow's integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Running => 1,
            Self::Scheduled => 2,
            Self::Finished => 3,
            Self::Failed => 4,
            Self::Killed => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Running),
            2 => Some(Self::Scheduled),
            3 => Some(Self::Finished),
            4 => Some(Self::Failed),
            5 => Some(Self::Killed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Killed)
    }
}

/// Contents of an experiment's `meta.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMeta {
    pub artifact_location: String,
    pub creation_time: i64,
    pub experiment_id: String,
    pub last_update_time: i64,
    pub lifecycle_stage: String,
    pub name: String,
}

/// Contents of a run's `meta.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub artifact_uri: String,
    pub end_time: Option<i64>,
    pub experiment_id: String,
    pub lifecycle_stage: String,
    pub run_id: String,
    pub run_name: String,
    pub run_uuid: String,
    pub start_time: i64,
    pub status: u8,
    pub user_id: String,
}

impl RunInfo {
    pub fn status(&self) -> Option<RunStatus> {
        RunStatus::from_code(self.status)
    }
}

/// One logged metric value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricPoint {
    pub timestamp: i64,
    pub value: f64,
    pub step: i64,
}

/// Everything recorded for a run, read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub info: RunInfo,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, Vec<MetricPoint>>,
    pub tags: BTreeMap<String, String>,
}

impl RunRecord {
    /// Value from the highest step of `key`, latest write winning ties.
    pub fn latest_metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(|points| {
            points
                .iter()
                .max_by(|a, b| a.step.cmp(&b.step).then(a.timestamp.cmp(&b.timestamp)))
                .map(|p| p.value)
        })
    }
}

/// Handle on one experiment in a file store.
#[derive(Debug, Clone)]
pub struct ExperimentTracker {
    root: PathBuf,
    meta: ExperimentMeta,
}

impl ExperimentTracker {
    /// Open the experiment called `name` under `root`, creating it if needed.
    ///
    /// `Default` is experiment `0`; other new experiments take the next free
    /// integer id.
    pub fn new(root: impl Into<PathBuf>, name: &str) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        if let Some(meta) = find_experiment(&root, name)? {
            debug!("Using experiment '{}' ({})", name, meta.experiment_id);
            return Ok(Self { root, meta });
        }

        let id = if name == DEFAULT_EXPERIMENT {
            "0".to_string()
        } else {
            next_experiment_id(&root)?.to_string()
        };
        let dir = root.join(&id);
        fs::create_dir_all(&dir)?;

        let now = now_millis();
        let meta = ExperimentMeta {
            artifact_location: file_uri(&dir),
            creation_time: now,
            experiment_id: id,
            last_update_time: now,
            lifecycle_stage: "active".to_string(),
            name: name.to_string(),
        };
        write_yaml(&dir.join(META_FILE), &meta)?;
        info!(
            "Created experiment '{}' with id {} in {}",
            name,
            meta.experiment_id,
            root.display()
        );
        Ok(Self { root, meta })
    }

    pub fn experiment_id(&self) -> &str {
        &self.meta.experiment_id
    }

    pub fn experiment_name(&self) -> &str {
        &self.meta.name
    }

    pub fn experiment_dir(&self) -> PathBuf {
        self.root.join(&self.meta.experiment_id)
    }

    /// Start a new run; the returned guard marks it `FAILED` if dropped
    /// before [`ActiveRun::finish`].
    pub fn start_run(&self, run_name: Option<&str>) -> Result<ActiveRun> {
        ActiveRun::start(&self.experiment_dir(), &self.meta.experiment_id, run_name)
    }

    /// Metadata of every run in the experiment, oldest first.
    pub fn list_runs(&self) -> Result<Vec<RunInfo>> {
        let mut runs = Vec::new();
        for entry in fs::read_dir(self.experiment_dir())? {
            let path = entry?.path();
            let meta = path.join(META_FILE);
            if path.is_dir() && meta.is_file() {
                runs.push(read_yaml::<RunInfo>(&meta)?);
            }
        }
        runs.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.run_id.cmp(&b.run_id)));
        Ok(runs)
    }

    /// Read back everything recorded for `run_id`.
    pub fn load_run(&self, run_id: &str) -> Result<RunRecord> {
        let dir = self.experiment_dir().join(run_id);
        let meta = dir.join(META_FILE);
        if !meta.is_file() {
            return Err(PipelineError::Tracking(format!("run '{run_id}' not found")));
        }

        let info: RunInfo = read_yaml(&meta)?;
        let params = read_key_files(&dir.join("params"))?;
        let tags = read_key_files(&dir.join("tags"))?;
        let metrics = read_key_files(&dir.join("metrics"))?
            .into_iter()
            .map(|(key, body)| -> Result<(String, Vec<MetricPoint>)> {
                let points = parse_metric_lines(&key, &body)?;
                Ok((key, points))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(RunRecord {
            info,
            params,
            metrics,
            tags,
        })
    }
}

// ============================================================================
// File helpers
// ============================================================================

fn find_experiment(root: &Path, name: &str) -> Result<Option<ExperimentMeta>> {
    for entry in fs::read_dir(root)? {
        let meta = entry?.path().join(META_FILE);
        if meta.is_file() {
            let experiment: ExperimentMeta = read_yaml(&meta)?;
            if experiment.name == name {
                return Ok(Some(experiment));
            }
        }
    }
    Ok(None)
}

fn next_experiment_id(root: &Path) -> Result<u64> {
    let mut next = 1;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) {
            next = next.max(id + 1);
        }
    }
    Ok(next)
}

pub(crate) fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

pub(crate) fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, serde_yaml::to_string(value)?)?;
    Ok(())
}

/// `key -> file contents` for every file below `dir`; nested keys use `/`.
fn read_key_files(dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let key = path
                .strip_prefix(dir)
                .map_err(|e| PipelineError::Tracking(e.to_string()))?
                .to_string_lossy()
                .replace('\\', "/");
            out.insert(key, fs::read_to_string(&path)?);
        }
    }
    Ok(out)
}

fn parse_metric_lines(key: &str, body: &str) -> Result<Vec<MetricPoint>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| -> Result<MetricPoint> {
            let bad = || PipelineError::Tracking(format!("malformed line in metric '{key}': {line}"));
            let mut parts = line.split_whitespace();
            let timestamp = parts.next().and_then(|v| v.parse().ok()).ok_or_else(bad)?;
            let value = parts.next().and_then(|v| v.parse().ok()).ok_or_else(bad)?;
            let step = match parts.next() {
                Some(v) => v.parse().map_err(|_| bad())?,
                None => 0,
            };
            Ok(MetricPoint {
                timestamp,
                value,
                step,
            })
        })
        .collect()
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn file_uri(path: &Path) -> String {
    let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}
