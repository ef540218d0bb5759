//! Binary classification metrics.
//!
//! The positive class is `1.0`. Precision, recall, and F1 are `0.0` when
//! their denominator is zero.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView1;
use reserva_common::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Evaluation of a fitted model on held-out data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: f64,
}

impl Metrics {
    /// Compute every metric from labels, predicted labels, and positive-class
    /// probabilities.
    pub fn compute(
        y_true: ArrayView1<f64>,
        y_pred: ArrayView1<f64>,
        y_score: ArrayView1<f64>,
    ) -> Result<Self> {
        let counts = Confusion::new(y_true, y_pred)?;
        Ok(Self {
            accuracy: counts.accuracy(),
            precision: counts.precision(),
            recall: counts.recall(),
            f1_score: counts.f1(),
            roc_auc: roc_auc(y_true, y_score)?,
        })
    }

    /// Metric name to value, in the shape the tracker logs.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("accuracy".to_string(), self.accuracy),
            ("precision".to_string(), self.precision),
            ("recall".to_string(), self.recall),
            ("f1_score".to_string(), self.f1_score),
            ("roc_auc".to_string(), self.roc_auc),
        ])
    }
}

// ============================================================================
// Confusion counts
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct Confusion {
    tp: usize,
    fp: usize,
    tn: usize,
    fn_: usize,
}

impl Confusion {
    fn new(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<Self> {
        check_lengths(y_true.len(), y_pred.len())?;
        let mut counts = Self::default();
        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            match (*t == 1.0, *p == 1.0) {
                (true, true) => counts.tp += 1,
                (false, true) => counts.fp += 1,
                (false, false) => counts.tn += 1,
                (true, false) => counts.fn_ += 1,
            }
        }
        Ok(counts)
    }

    fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    fn f1(&self) -> f64 {
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn check_lengths(a: usize, b: usize) -> Result<()> {
    if a != b {
        return Err(PipelineError::InvalidData(format!(
            "length mismatch: {a} labels, {b} predictions"
        )));
    }
    if a == 0 {
        return Err(PipelineError::InvalidData(
            "cannot score an empty set".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// Public metric functions
// ============================================================================

pub fn accuracy(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<f64> {
    Ok(Confusion::new(y_true, y_pred)?.accuracy())
}

pub fn precision(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<f64> {
    Ok(Confusion::new(y_true, y_pred)?.precision())
}

pub fn recall(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<f64> {
    Ok(Confusion::new(y_true, y_pred)?.recall())
}

pub fn f1_score(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<f64> {
    Ok(Confusion::new(y_true, y_pred)?.f1())
}

/// Area under the ROC curve from scores, via the rank-sum statistic.
/// Tied scores share their average rank.
///
/// Fails with `InvalidData` unless both classes are present.
pub fn roc_auc(y_true: ArrayView1<f64>, y_score: ArrayView1<f64>) -> Result<f64> {
    check_lengths(y_true.len(), y_score.len())?;
    let n_pos = y_true.iter().filter(|t| **t == 1.0).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(PipelineError::InvalidData(
            "ROC AUC is undefined when only one class is present".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| y_score[a].total_cmp(&y_score[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && y_score[order[end + 1]] == y_score[order[start]] {
            end += 1;
        }
        // ranks are 1-based
        let average_rank = (start + end) as f64 / 2.0 + 1.0;
        let positives = order[start..=end]
            .iter()
            .filter(|&&i| y_true[i] == 1.0)
            .count();
        positive_rank_sum += average_rank * positives as f64;
        start = end + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

// ============================================================================
// Scoring
// ============================================================================

/// Metric the hyperparameter search maximises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scoring {
    Accuracy,
    F1,
    Precision,
    Recall,
    RocAuc,
}

impl Scoring {
    /// Score a fold from labels, predicted labels, and positive-class scores.
    pub fn score(
        &self,
        y_true: ArrayView1<f64>,
        y_pred: ArrayView1<f64>,
        y_score: ArrayView1<f64>,
    ) -> Result<f64> {
        match self {
            Self::Accuracy => accuracy(y_true, y_pred),
            Self::F1 => f1_score(y_true, y_pred),
            Self::Precision => precision(y_true, y_pred),
            Self::Recall => recall(y_true, y_pred),
            Self::RocAuc => roc_auc(y_true, y_score),
        }
    }
}

impl FromStr for Scoring {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "accuracy" => Ok(Self::Accuracy),
            "f1" => Ok(Self::F1),
            "precision" => Ok(Self::Precision),
            "recall" => Ok(Self::Recall),
            "roc_auc" => Ok(Self::RocAuc),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown scoring '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accuracy => "accuracy",
            Self::F1 => "f1",
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::RocAuc => "roc_auc",
        };
        f.write_str(name)
    }
}
