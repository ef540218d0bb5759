//! Training stage: processed CSVs in, fitted model and tracked run out.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use polars::prelude::DataFrame;
use reserva_common::{
    AppConfig, ArtifactPaths, ModelTrainingConfig, Result, TARGET_COLUMN, column_as_f64,
    feature_names, load_table, stage_scope,
};
use tracing::{error, info};

use crate::gbdt::GbdtClassifier;
use crate::metrics::Metrics;
use crate::search::{RandomizedSearch, SearchResult, format_params};
use crate::tracking::{ActiveRun, ExperimentTracker};

/// Feature matrices and targets for both splits.
pub type SplitData = (Array2<f64>, Array1<f64>, Array2<f64>, Array1<f64>);

/// Artifact subdirectory the processed splits are logged under.
const DATASET_ARTIFACT_PATH: &str = "artifacts";

/// Tunes, evaluates, and persists the cancellation model.
pub struct ModelTraining {
    config: ModelTrainingConfig,
    paths: ArtifactPaths,
}

impl ModelTraining {
    pub fn new(config: &AppConfig, paths: ArtifactPaths) -> Self {
        Self {
            config: config.model_training.clone(),
            paths,
        }
    }

    /// Processed train/test tables as `(x_train, y_train, x_test, y_test)`.
    pub fn load_split(&self) -> Result<SplitData> {
        stage_scope("Error while loading and splitting data", || {
            info!(
                "Loading data from {} and {}",
                self.paths.processed_train.display(),
                self.paths.processed_test.display()
            );
            let train = load_table(&self.paths.processed_train)?;
            let test = load_table(&self.paths.processed_test)?;

            let features = feature_names(&train, TARGET_COLUMN);
            let (x_train, y_train) = to_arrays(&train, &features)?;
            let (x_test, y_test) = to_arrays(&test, &features)?;
            info!(
                "Data loaded: {} train rows, {} test rows, {} features",
                x_train.nrows(),
                x_test.nrows(),
                features.len()
            );
            Ok((x_train, y_train, x_test, y_test))
        })
    }

    /// Randomized search over the configured distributions, refit on all rows.
    pub fn train_model(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<SearchResult> {
        stage_scope("Error while training the model", || {
            info!("Starting randomized search");
            let search = RandomizedSearch::new(
                self.config.random_search.clone(),
                self.config.param_distributions.clone(),
            )?;
            let result = search.fit(x, y)?;
            info!("Best parameters found: {}", format_params(&result.best_params));
            info!("Best score: {:.6}", result.best_score);
            Ok(result)
        })
    }

    /// Score `model` on held-out data.
    pub fn evaluate(
        &self,
        model: &GbdtClassifier,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<Metrics> {
        stage_scope("Error while evaluating the model", || {
            info!("Starting model evaluation");
            let y_pred = model.predict(x)?;
            let y_score = model.predict_proba(x)?;
            let metrics = Metrics::compute(y, y_pred.view(), y_score.view())?;

            info!("Accuracy: {:.6}", metrics.accuracy);
            info!("F1 Score: {:.6}", metrics.f1_score);
            info!("Precision: {:.6}", metrics.precision);
            info!("Recall: {:.6}", metrics.recall);
            info!("ROC AUC Score: {:.6}", metrics.roc_auc);
            Ok(metrics)
        })
    }

    /// Write the model JSON to `path`.
    pub fn persist(&self, model: &GbdtClassifier, path: &Path) -> Result<()> {
        stage_scope("Error while saving the model", || {
            model.save(path)?;
            info!("Model saved to {}", path.display());
            Ok(())
        })
    }

    /// Run the stage inside a tracked run and return the test metrics.
    ///
    /// A failure tags the run with the serialized error and marks it failed.
    pub fn run(&self) -> Result<Metrics> {
        let tracker = stage_scope("Error while opening the experiment tracker", || {
            ExperimentTracker::new(self.config.tracking_root(), &self.config.experiment_name)
        })?;
        let mut run = tracker.start_run(None)?;

        match self.run_tracked(&mut run) {
            Ok(metrics) => {
                run.finish()?;
                info!("Model training completed successfully");
                Ok(metrics)
            }
            Err(err) => {
                error!("Model training failed: {}", err);
                let tag = serde_json::to_string(&err)?;
                if let Err(tag_err) = run.set_tag("error", &tag) {
                    error!("Could not tag run {}: {}", run.run_id(), tag_err);
                }
                run.fail()?;
                Err(err)
            }
        }
    }

    fn run_tracked(&self, run: &mut ActiveRun) -> Result<Metrics> {
        stage_scope("Error while model training pipeline", || {
            info!("Logging the processed datasets to the tracker");
            run.log_artifact(&self.paths.processed_train, Some(DATASET_ARTIFACT_PATH))?;
            run.log_artifact(&self.paths.processed_test, Some(DATASET_ARTIFACT_PATH))?;

            let (x_train, y_train, x_test, y_test) = self.load_split()?;
            let search = self.train_model(x_train.view(), y_train.view())?;
            let model = search.best_estimator;
            let metrics = self.evaluate(&model, x_test.view(), y_test.view())?;

            self.persist(&model, &self.paths.model_file)?;
            run.log_artifact(&self.paths.model_file, None)?;
            info!("Logging the model to the tracker is completed");

            run.log_params(&model.get_params())?;
            run.log_metrics(&metrics.to_map())?;
            Ok(metrics)
        })
    }
}

/// Row-major feature matrix over `features` plus the target vector.
fn to_arrays(df: &DataFrame, features: &[String]) -> Result<(Array2<f64>, Array1<f64>)> {
    let mut x = Array2::zeros((df.height(), features.len()));
    for (j, name) in features.iter().enumerate() {
        let values = column_as_f64(df, name)?;
        x.column_mut(j).assign(&ArrayView1::from(&values[..]));
    }
    let y = Array1::from(column_as_f64(df, TARGET_COLUMN)?);
    Ok((x, y))
}
