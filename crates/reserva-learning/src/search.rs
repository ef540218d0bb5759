//! Randomized hyperparameter search with stratified cross-validation.
//!
//! `n_iter` settings are drawn from the configured distributions with a
//! seeded RNG. Every (setting, fold) fit runs on a dedicated rayon pool; the
//! scores are gathered back in candidate order, so the outcome only depends
//! on the seed.

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use reserva_common::{ParamDistribution, ParamValue, PipelineError, RandomSearchConfig, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::gbdt::{GbdtClassifier, GbdtParams};
use crate::metrics::Scoring;

/// One sampled parameter setting.
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Cross-validation outcome for one setting.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateResult {
    pub params: ParamSet,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

/// Outcome of [`RandomizedSearch::fit`].
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Best setting refit on all training rows.
    pub best_estimator: GbdtClassifier,
    pub best_params: ParamSet,
    pub best_score: f64,
    pub candidates: Vec<CandidateResult>,
}

/// Randomized search over [`GbdtClassifier`] hyperparameters.
#[derive(Debug, Clone)]
pub struct RandomizedSearch {
    config: RandomSearchConfig,
    distributions: BTreeMap<String, ParamDistribution>,
    base: GbdtParams,
    scoring: Scoring,
}

impl RandomizedSearch {
    pub fn new(
        config: RandomSearchConfig,
        distributions: BTreeMap<String, ParamDistribution>,
    ) -> Result<Self> {
        let scoring = config.scoring.parse()?;
        Ok(Self {
            config,
            distributions,
            base: GbdtParams::default(),
            scoring,
        })
    }

    /// Parameters every candidate starts from before sampling.
    pub fn with_base_params(mut self, base: GbdtParams) -> Self {
        self.base = base;
        self
    }

    /// Draw the `n_iter` candidate settings.
    pub fn sample_candidates(&self) -> Result<Vec<ParamSet>> {
        let mut rng = StdRng::seed_from_u64(self.config.random_state);
        let mut candidates = Vec::with_capacity(self.config.n_iter);
        for _ in 0..self.config.n_iter {
            let mut set = ParamSet::new();
            for (name, distribution) in &self.distributions {
                set.insert(name.clone(), sample(distribution, &mut rng, name)?);
            }
            candidates.push(set);
        }
        Ok(candidates)
    }

    /// Cross-validate every candidate, then refit the best on all of `x`.
    pub fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<SearchResult> {
        let candidates = self.sample_candidates()?;
        let folds = stratified_folds(y, self.config.cv)?;
        let estimators: Vec<GbdtParams> = candidates
            .iter()
            .map(|set| self.base.clone().with_values(set))
            .collect::<Result<_>>()?;

        info!(
            "Fitting {} folds for each of {} candidates, totalling {} fits",
            folds.len(),
            candidates.len(),
            folds.len() * candidates.len()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads(self.config.n_jobs))
            .build()
            .map_err(|e| PipelineError::Training(format!("cannot start search workers: {e}")))?;

        let tasks: Vec<(usize, usize)> = (0..estimators.len())
            .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
            .collect();
        let scores: Vec<f64> = pool.install(|| {
            tasks
                .par_iter()
                .map(|&(c, f)| self.score_fold(&estimators[c], &folds, f, x, y))
                .collect::<Result<_>>()
        })?;

        let mut results = Vec::with_capacity(candidates.len());
        for (index, (params, fold_scores)) in candidates
            .into_iter()
            .zip(scores.chunks(folds.len()))
            .enumerate()
        {
            let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
            if self.config.verbose >= 2 {
                for (fold, score) in fold_scores.iter().enumerate() {
                    debug!(
                        "[CV {}/{}] candidate {}: {}={:.4}",
                        fold + 1,
                        folds.len(),
                        index,
                        self.scoring,
                        score
                    );
                }
            }
            if self.config.verbose >= 1 {
                info!(
                    "Candidate {} {}: mean {}={:.4}",
                    index,
                    format_params(&params),
                    self.scoring,
                    mean_score
                );
            }
            results.push(CandidateResult {
                params,
                fold_scores: fold_scores.to_vec(),
                mean_score,
            });
        }

        let best = results
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, r)| match best {
                Some((_, top)) if top >= r.mean_score => best,
                _ => Some((i, r.mean_score)),
            })
            .map(|(i, _)| i)
            .ok_or_else(|| PipelineError::Training("no candidates were evaluated".to_string()))?;

        info!(
            "Best {}={:.4} with {}",
            self.scoring,
            results[best].mean_score,
            format_params(&results[best].params)
        );

        let mut best_estimator = GbdtClassifier::new(estimators[best].clone());
        best_estimator.fit(x, y)?;

        Ok(SearchResult {
            best_estimator,
            best_params: results[best].params.clone(),
            best_score: results[best].mean_score,
            candidates: results,
        })
    }

    fn score_fold(
        &self,
        params: &GbdtParams,
        folds: &[Vec<usize>],
        test_fold: usize,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<f64> {
        let test_idx = &folds[test_fold];
        let train_idx: Vec<usize> = folds
            .iter()
            .enumerate()
            .filter(|(f, _)| *f != test_fold)
            .flat_map(|(_, rows)| rows.iter().copied())
            .collect();

        let mut model = GbdtClassifier::new(params.clone());
        model.fit(
            x.select(Axis(0), &train_idx).view(),
            y.select(Axis(0), &train_idx).view(),
        )?;

        let x_test = x.select(Axis(0), test_idx);
        let y_test: Array1<f64> = y.select(Axis(0), test_idx);
        let proba = model.predict_proba(x_test.view())?;
        let predicted = proba.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 });
        self.scoring
            .score(y_test.view(), predicted.view(), proba.view())
    }
}

/// Rayon thread count for `n_jobs`; `0` lets rayon use every core.
fn worker_threads(n_jobs: i32) -> usize {
    if n_jobs < 0 { 0 } else { n_jobs as usize }
}

fn sample(distribution: &ParamDistribution, rng: &mut StdRng, name: &str) -> Result<ParamValue> {
    match distribution {
        ParamDistribution::Randint(low, high) if low < high => {
            Ok(ParamValue::Int(rng.gen_range(*low..*high)))
        }
        ParamDistribution::Uniform(loc, scale) if *scale >= 0.0 => {
            Ok(ParamValue::Float(loc + scale * rng.gen_range(0.0..=1.0)))
        }
        ParamDistribution::Choice(values) if !values.is_empty() => {
            Ok(values[rng.gen_range(0..values.len())].clone())
        }
        _ => Err(PipelineError::InvalidConfig(format!(
            "empty distribution for parameter '{name}'"
        ))),
    }
}

/// Split row indices into `k` folds that keep each class's proportion.
///
/// Rows of each class are dealt to folds in contiguous, near-equal chunks,
/// in row order. The folds receiving a class's leftover rows rotate from one
/// class to the next so fold sizes stay within one of each other.
pub fn stratified_folds(y: ArrayView1<f64>, k: usize) -> Result<Vec<Vec<usize>>> {
    if k < 2 {
        return Err(PipelineError::InvalidConfig(format!(
            "cross-validation needs at least 2 folds, got {k}"
        )));
    }
    if k > y.len() {
        return Err(PipelineError::InvalidConfig(format!(
            "cannot make {k} folds from {} rows",
            y.len()
        )));
    }

    let mut by_class: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for (i, label) in y.iter().enumerate() {
        by_class.entry(label.to_bits()).or_default().push(i);
    }

    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); k];
    let mut offset = 0;
    for (label, rows) in &by_class {
        if rows.len() < k {
            warn!(
                "Class {} has only {} rows, fewer than {} folds",
                f64::from_bits(*label),
                rows.len(),
                k
            );
        }
        let base = rows.len() / k;
        let extra = rows.len() % k;
        let mut start = 0;
        for (f, fold) in folds.iter_mut().enumerate() {
            let gets_extra = (f + k - offset) % k < extra;
            let size = base + usize::from(gets_extra);
            fold.extend_from_slice(&rows[start..start + size]);
            start += size;
        }
        offset = (offset + extra) % k;
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// `{name=value, ...}` in key order, for log lines.
pub fn format_params(params: &ParamSet) -> String {
    let pairs: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", pairs.join(", "))
}
