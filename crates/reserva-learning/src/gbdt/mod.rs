//! Gradient-boosted decision trees for binary classification.
//!
//! Histogram-based boosting with leaf-wise tree growth on the logistic loss,
//! parameterised with the LightGBM names the search space uses
//! (`n_estimators`, `learning_rate`, `num_leaves`, `max_depth`, ...).
//!
//! # Example
//!
//! ```rust,ignore
//! use reserva_learning::gbdt::{GbdtClassifier, GbdtParams};
//!
//! let mut model = GbdtClassifier::new(GbdtParams::default());
//! model.fit(x_train.view(), y_train.view())?;
//! let proba = model.predict_proba(x_test.view())?;
//! model.save("artifacts/models/lgbm_model.json")?;
//! ```

pub mod binning;
pub mod grower;
pub mod tree;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use reserva_common::{ParamValue, PipelineError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use binning::BinMapper;
use grower::{GrowerParams, TreeGrower};
use tree::{Node, Tree};

/// Probabilities are kept this far from 0 and 1 when taking log-odds.
const PROB_EPS: f64 = 1e-15;

/// Hessians are floored here so leaf weights stay finite.
const HESS_MIN: f64 = 1e-16;

// ============================================================================
// Parameters
// ============================================================================

/// Booster hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtParams {
    /// Only `gbdt` is implemented.
    pub boosting_type: String,
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub num_leaves: usize,
    /// Zero or negative for unlimited.
    pub max_depth: i64,
    pub min_child_samples: usize,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub max_bin: usize,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            boosting_type: "gbdt".to_string(),
            n_estimators: 100,
            learning_rate: 0.1,
            num_leaves: 31,
            max_depth: -1,
            min_child_samples: 20,
            min_child_weight: 1e-3,
            reg_lambda: 0.0,
            max_bin: binning::MAX_BIN,
        }
    }
}

impl GbdtParams {
    /// Set one parameter by name.
    pub fn set(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let invalid = || {
            PipelineError::InvalidConfig(format!("invalid value '{value}' for parameter '{name}'"))
        };
        let count = |min: i64| {
            value
                .as_i64()
                .filter(|v| *v >= min)
                .map(|v| v as usize)
                .ok_or_else(invalid)
        };
        let float = |min: f64| value.as_f64().filter(|v| *v >= min).ok_or_else(invalid);

        match name {
            "boosting_type" => {
                let kind = value.as_str().ok_or_else(invalid)?;
                if kind != "gbdt" {
                    return Err(PipelineError::InvalidConfig(format!(
                        "boosting_type '{kind}' is not supported (only 'gbdt')"
                    )));
                }
                self.boosting_type = kind.to_string();
            }
            "n_estimators" => self.n_estimators = count(1)?,
            "num_leaves" => self.num_leaves = count(2)?,
            "min_child_samples" => self.min_child_samples = count(1)?,
            "max_bin" => self.max_bin = count(2)?,
            "max_depth" => self.max_depth = value.as_i64().ok_or_else(invalid)?,
            "learning_rate" => {
                self.learning_rate = value.as_f64().filter(|v| *v > 0.0).ok_or_else(invalid)?
            }
            "min_child_weight" => self.min_child_weight = float(0.0)?,
            "reg_lambda" => self.reg_lambda = float(0.0)?,
            other => {
                return Err(PipelineError::InvalidConfig(format!(
                    "unknown parameter '{other}'"
                )));
            }
        }
        Ok(())
    }

    /// Apply every entry of `values`.
    pub fn with_values<'a>(
        mut self,
        values: impl IntoIterator<Item = (&'a String, &'a ParamValue)>,
    ) -> Result<Self> {
        for (name, value) in values {
            self.set(name, value)?;
        }
        Ok(self)
    }

    /// Parameters as JSON values, keyed by name.
    pub fn to_map(&self) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::from([
            ("boosting_type".to_string(), self.boosting_type.clone().into()),
            ("n_estimators".to_string(), self.n_estimators.into()),
            ("learning_rate".to_string(), self.learning_rate.into()),
            ("num_leaves".to_string(), self.num_leaves.into()),
            ("max_depth".to_string(), self.max_depth.into()),
            ("min_child_samples".to_string(), self.min_child_samples.into()),
            ("min_child_weight".to_string(), self.min_child_weight.into()),
            ("reg_lambda".to_string(), self.reg_lambda.into()),
            ("max_bin".to_string(), self.max_bin.into()),
        ])
    }

    fn grower_params(&self) -> GrowerParams {
        GrowerParams {
            num_leaves: self.num_leaves,
            max_depth: usize::try_from(self.max_depth).ok().filter(|d| *d > 0),
            min_child_samples: self.min_child_samples,
            min_child_weight: self.min_child_weight,
            reg_lambda: self.reg_lambda,
            learning_rate: self.learning_rate,
        }
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Binary classifier over labels `0.0` / `1.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbdtClassifier {
    params: GbdtParams,
    init_score: f64,
    n_features: usize,
    trees: Vec<Tree>,
}

impl GbdtClassifier {
    pub fn new(params: GbdtParams) -> Self {
        Self {
            params,
            init_score: 0.0,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &GbdtParams {
        &self.params
    }

    /// Hyperparameters as `name -> value`, for experiment tracking.
    pub fn get_params(&self) -> BTreeMap<String, serde_json::Value> {
        self.params.to_map()
    }

    pub fn is_fitted(&self) -> bool {
        self.n_features > 0
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Fit from scratch on `x` (rows are samples) and binary labels `y`.
    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        let (n_rows, n_features) = x.dim();
        if n_rows == 0 || n_features == 0 {
            return Err(PipelineError::InvalidData(
                "cannot fit on an empty matrix".to_string(),
            ));
        }
        if y.len() != n_rows {
            return Err(PipelineError::InvalidData(format!(
                "{} rows but {} labels",
                n_rows,
                y.len()
            )));
        }
        if let Some(bad) = y.iter().find(|v| **v != 0.0 && **v != 1.0) {
            return Err(PipelineError::InvalidData(format!(
                "labels must be 0 or 1, found {bad}"
            )));
        }

        let mapper = BinMapper::fit(x, self.params.max_bin);
        let binned = mapper.transform(x);
        let grower = TreeGrower::new(&binned, &mapper, self.params.grower_params());

        let positive = y.sum() / n_rows as f64;
        let p = positive.clamp(PROB_EPS, 1.0 - PROB_EPS);
        self.init_score = (p / (1.0 - p)).ln();
        self.n_features = n_features;
        self.trees = Vec::with_capacity(self.params.n_estimators);

        let mut raw = vec![self.init_score; n_rows];
        let mut grad = vec![0.0; n_rows];
        let mut hess = vec![0.0; n_rows];
        for _ in 0..self.params.n_estimators {
            for (i, label) in y.iter().enumerate() {
                let p = sigmoid(raw[i]);
                grad[i] = p - label;
                hess[i] = (p * (1.0 - p)).max(HESS_MIN);
            }

            let (tree, values) = grower.grow(&grad, &hess);
            for (score, value) in raw.iter_mut().zip(values) {
                *score += value;
            }
            self.trees.push(tree);
        }

        debug!(
            "Fitted {} trees on {} rows x {} features (params: {:?})",
            self.trees.len(),
            n_rows,
            n_features,
            self.params
        );
        Ok(())
    }

    /// Log-odds of the positive class.
    pub fn decision_function(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(PipelineError::Training("model is not fitted".to_string()));
        }
        if x.ncols() != self.n_features {
            return Err(PipelineError::InvalidData(format!(
                "model expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }

        let mut row_buf = vec![0.0; self.n_features];
        let scores = x
            .axis_iter(Axis(0))
            .map(|row| {
                for (slot, value) in row_buf.iter_mut().zip(row.iter()) {
                    *slot = *value;
                }
                self.init_score + self.trees.iter().map(|t| t.predict(&row_buf)).sum::<f64>()
            })
            .collect();
        Ok(scores)
    }

    /// Probability of the positive class (`1.0`) for each row.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }

    /// Predicted labels, `1.0` where the positive probability exceeds 0.5.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }

    /// Number of splits using each feature, over all trees.
    pub fn feature_importances(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_features];
        for tree in &self.trees {
            for node in tree.nodes() {
                if let Node::Split { feature, .. } = node {
                    counts[*feature] += 1;
                }
            }
        }
        counts
    }

    /// Write the fitted model as JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        info!("Model saved to {}", path.display());
        Ok(())
    }

    /// Read a model written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PipelineError::NotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use pretty_assertions::assert_eq;

    /// Label is 1 when x0 + x1 > 30; x2 is noise.
    fn toy_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 => (i % 50) as f64,
            1 => ((i * 7) % 13) as f64,
            _ => ((i * 31) % 17) as f64,
        });
        let y = Array1::from_shape_fn(n, |i| if (i % 50) + (i * 7) % 13 > 30 { 1.0 } else { 0.0 });
        (x, y)
    }

    fn accuracy(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
        a.iter().zip(b).filter(|(p, q)| p == q).count() as f64 / a.len() as f64
    }

    #[test]
    fn test_learns_separable_rule() {
        let (x, y) = toy_data(400);
        let params = GbdtParams {
            n_estimators: 100,
            num_leaves: 8,
            min_child_samples: 5,
            ..GbdtParams::default()
        };
        let mut model = GbdtClassifier::new(params);
        model.fit(x.view(), y.view()).unwrap();

        let predicted = model.predict(x.view()).unwrap();
        assert!(accuracy(&predicted, &y) > 0.9);

        let proba = model.predict_proba(x.view()).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(model.trees().len(), 100);
    }

    #[test]
    fn test_rejects_bad_labels_and_shapes() {
        let x = Array2::<f64>::zeros((3, 2));
        let mut model = GbdtClassifier::new(GbdtParams::default());

        let err = model.fit(x.view(), Array1::from(vec![0.0, 2.0, 1.0]).view()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");

        let err = model.fit(x.view(), Array1::from(vec![0.0, 1.0]).view()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");
    }

    #[test]
    fn test_unfitted_and_wrong_width() {
        let model = GbdtClassifier::new(GbdtParams::default());
        let err = model.predict(Array2::<f64>::zeros((1, 3)).view()).unwrap_err();
        assert_eq!(err.error_code(), "TRAINING_ERROR");

        let (x, y) = toy_data(100);
        let mut model = GbdtClassifier::new(GbdtParams {
            n_estimators: 3,
            ..GbdtParams::default()
        });
        model.fit(x.view(), y.view()).unwrap();
        let err = model.predict(Array2::<f64>::zeros((1, 2)).view()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");
    }

    #[test]
    fn test_save_load_predicts_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models/model.json");
        let (x, y) = toy_data(200);
        let mut model = GbdtClassifier::new(GbdtParams {
            n_estimators: 10,
            ..GbdtParams::default()
        });
        model.fit(x.view(), y.view()).unwrap();
        model.save(&path).unwrap();

        let loaded = GbdtClassifier::load(&path).unwrap();
        let before = model.predict_proba(x.view()).unwrap();
        let after = loaded.predict_proba(x.view()).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
        assert_eq!(loaded.params(), model.params());
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let err = GbdtClassifier::load("/nonexistent/model.json").unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_set_params_by_name() {
        let mut params = GbdtParams::default();
        params.set("n_estimators", &ParamValue::Int(250)).unwrap();
        params.set("learning_rate", &ParamValue::Float(0.05)).unwrap();
        params.set("max_depth", &ParamValue::Int(7)).unwrap();
        params
            .set("boosting_type", &ParamValue::Str("gbdt".into()))
            .unwrap();

        let map = params.to_map();
        assert_eq!(map["n_estimators"], serde_json::json!(250));
        assert_eq!(map["learning_rate"], serde_json::json!(0.05));
        assert_eq!(map["max_depth"], serde_json::json!(7));
    }

    #[test]
    fn test_set_params_rejects() {
        let mut params = GbdtParams::default();
        for (name, value) in [
            ("boosting_type", ParamValue::Str("dart".into())),
            ("num_leaves", ParamValue::Int(1)),
            ("learning_rate", ParamValue::Float(0.0)),
            ("colsample_bytree", ParamValue::Float(0.5)),
            ("n_estimators", ParamValue::Str("many".into())),
        ] {
            let err = params.set(name, &value).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_CONFIG", "{name}");
        }
    }
}
