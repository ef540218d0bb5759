//! SMOTE oversampling.
//!
//! Each minority class is grown to the majority count by interpolating
//! between a class sample and one of its `k` nearest same-class neighbours.

use std::collections::BTreeMap;

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use reserva_common::{PipelineError, Result, column_as_f64, feature_names, require_column};
use tracing::{debug, info, warn};

/// Synthetic minority oversampling.
#[derive(Debug, Clone, Copy)]
pub struct Smote {
    pub k_neighbors: usize,
    pub seed: u64,
}

impl Default for Smote {
    fn default() -> Self {
        Self {
            k_neighbors: 5,
            seed: 42,
        }
    }
}

/// Synthetic rows produced for one class.
#[derive(Debug, Clone)]
pub struct SyntheticSamples {
    /// Row-major, `n_features` values per row.
    pub rows: Vec<f64>,
    pub count: usize,
}

impl Smote {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self { k_neighbors, seed }
    }

    /// Generate `n_samples` synthetic rows from `class_rows`
    /// (row-major, `n_features` per row).
    pub fn generate(
        &self,
        class_rows: &[f64],
        n_features: usize,
        n_samples: usize,
        rng: &mut StdRng,
    ) -> SyntheticSamples {
        let n_class = class_rows.len() / n_features.max(1);
        let mut rows = Vec::with_capacity(n_samples * n_features);

        if n_samples == 0 || n_class == 0 {
            return SyntheticSamples { rows, count: 0 };
        }

        if n_class == 1 {
            // nothing to interpolate towards
            for _ in 0..n_samples {
                rows.extend_from_slice(&class_rows[..n_features]);
            }
            return SyntheticSamples {
                rows,
                count: n_samples,
            };
        }

        let k = self.k_neighbors.clamp(1, n_class - 1);
        if k < self.k_neighbors {
            warn!(
                "Only {} samples in class; using {} neighbours instead of {}",
                n_class, k, self.k_neighbors
            );
        }

        let neighbors = nearest_neighbors(class_rows, n_features, k);
        for _ in 0..n_samples {
            let pick = rng.gen_range(0..n_class * k);
            let (row, nn) = (pick / k, neighbors[pick / k][pick % k]);
            let step: f64 = rng.gen_range(0.0..1.0);

            let base = &class_rows[row * n_features..(row + 1) * n_features];
            let other = &class_rows[nn * n_features..(nn + 1) * n_features];
            rows.extend(base.iter().zip(other).map(|(a, b)| a + step * (b - a)));
        }

        SyntheticSamples {
            rows,
            count: n_samples,
        }
    }

    /// Oversample every minority class of `df` up to the majority count.
    ///
    /// Returns the feature columns (as floats) followed by `target`; the
    /// original rows come first, synthetic rows after them.
    pub fn fit_resample(&self, df: &DataFrame, target: &str) -> Result<DataFrame> {
        require_column(df, target)?;
        let features = feature_names(df, target);
        if features.is_empty() {
            return Err(PipelineError::InvalidData(
                "no feature columns to oversample".to_string(),
            ));
        }

        let columns: Vec<Vec<f64>> = features
            .iter()
            .map(|name| column_as_f64(df, name))
            .collect::<Result<_>>()?;
        let labels = target_labels(df, target)?;
        let n_features = features.len();

        let mut by_class: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, label) in labels.iter().enumerate() {
            by_class.entry(label.as_str()).or_default().push(i);
        }
        let majority = by_class.values().map(Vec::len).max().unwrap_or(0);
        if by_class.len() < 2 {
            warn!("Only one class in '{}'; nothing to balance", target);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut synthetic_columns: Vec<Vec<f64>> = vec![Vec::new(); n_features];
        let mut synthetic_labels: Vec<String> = Vec::new();

        for (class, members) in &by_class {
            let needed = majority - members.len();
            if needed == 0 {
                continue;
            }

            let class_rows: Vec<f64> = members
                .iter()
                .flat_map(|&i| columns.iter().map(move |col| col[i]))
                .collect();
            let samples = self.generate(&class_rows, n_features, needed, &mut rng);
            debug!(
                "Class '{}': {} samples, {} synthetic",
                class,
                members.len(),
                samples.count
            );

            for row in samples.rows.chunks(n_features) {
                for (column, value) in synthetic_columns.iter_mut().zip(row) {
                    column.push(*value);
                }
            }
            synthetic_labels.extend(std::iter::repeat_n(class.to_string(), samples.count));
        }

        let mut out: Vec<Column> = Vec::with_capacity(n_features + 1);
        for ((name, mut original), synthetic) in
            features.iter().zip(columns).zip(synthetic_columns)
        {
            original.extend(synthetic);
            out.push(Column::new(name.as_str().into(), original));
        }

        let original_target = df.column(target)?.as_materialized_series().clone();
        let synthetic_target = Series::new(target.into(), synthetic_labels)
            .cast(original_target.dtype())?;
        let mut full_target = original_target;
        full_target.append(&synthetic_target)?;
        out.push(full_target.into_column());

        let balanced = DataFrame::new(out)?;
        info!(
            "Balanced {} rows into {} ({} classes x {})",
            df.height(),
            balanced.height(),
            by_class.len(),
            majority
        );
        Ok(balanced)
    }
}

/// Target values as strings, so any label dtype can be grouped.
fn target_labels(df: &DataFrame, target: &str) -> Result<Vec<String>> {
    let series = df
        .column(target)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    series
        .str()?
        .into_iter()
        .map(|v| {
            v.map(str::to_string).ok_or_else(|| {
                PipelineError::InvalidData(format!("target '{target}' contains missing values"))
            })
        })
        .collect()
}

/// For each row, the indices of its `k` nearest other rows (euclidean).
fn nearest_neighbors(rows: &[f64], n_features: usize, k: usize) -> Vec<Vec<usize>> {
    let n = rows.len() / n_features;
    (0..n)
        .into_par_iter()
        .map(|i| {
            let a = &rows[i * n_features..(i + 1) * n_features];
            let mut distances: Vec<(f64, usize)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| {
                    let b = &rows[j * n_features..(j + 1) * n_features];
                    let d: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
                    (d, j)
                })
                .collect();
            distances.select_nth_unstable_by(k - 1, |x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
            let mut nearest: Vec<(f64, usize)> = distances[..k].to_vec();
            nearest.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
            nearest.into_iter().map(|(_, j)| j).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_counts(df: &DataFrame, target: &str) -> BTreeMap<String, usize> {
        let labels = target_labels(df, target).unwrap();
        let mut counts = BTreeMap::new();
        for label in labels {
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn test_classes_end_up_equal() {
        let df = df![
            "lead_time" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 50.0, 60.0],
            "price" => [10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 90.0, 95.0],
            "booking_status" => [1i64, 1, 1, 1, 1, 1, 1, 0, 0],
        ]
        .unwrap();

        let balanced = Smote::new(5, 42).fit_resample(&df, "booking_status").unwrap();

        assert_eq!(balanced.height(), 14);
        let counts = class_counts(&balanced, "booking_status");
        assert_eq!(counts["0"], 7);
        assert_eq!(counts["1"], 7);
        assert_eq!(
            balanced.column("booking_status").unwrap().dtype(),
            &DataType::Int64
        );
    }

    #[test]
    fn test_originals_first_and_synthetics_interpolate() {
        let df = df![
            "x" => [0.0, 1.0, 2.0, 3.0, 10.0, 20.0],
            "y" => ["a", "a", "a", "a", "b", "b"],
        ]
        .unwrap();

        let balanced = Smote::new(5, 7).fit_resample(&df, "y").unwrap();
        let x = column_as_f64(&balanced, "x").unwrap();

        assert_eq!(&x[..6], &[0.0, 1.0, 2.0, 3.0, 10.0, 20.0]);
        for value in &x[6..] {
            assert!((10.0..=20.0).contains(value), "{value} outside minority hull");
        }
    }

    #[test]
    fn test_single_sample_class_is_duplicated() {
        let df = df![
            "x" => [0.0, 1.0, 2.0, 42.0],
            "y" => ["a", "a", "a", "b"],
        ]
        .unwrap();

        let balanced = Smote::default().fit_resample(&df, "y").unwrap();
        let x = column_as_f64(&balanced, "x").unwrap();
        assert_eq!(&x[4..], &[42.0, 42.0]);
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let df = df![
            "x" => [0.0, 1.0, 2.0, 3.0, 4.0, 9.0, 11.0, 13.0],
            "y" => [0i64, 0, 0, 0, 0, 1, 1, 1],
        ]
        .unwrap();

        let a = Smote::new(2, 3).fit_resample(&df, "y").unwrap();
        let b = Smote::new(2, 3).fit_resample(&df, "y").unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn test_string_features_rejected() {
        let df = df![
            "meal" => ["Meal Plan 1", "Meal Plan 2"],
            "y" => [0i64, 1],
        ]
        .unwrap();

        let err = Smote::default().fit_resample(&df, "y").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");
    }

    #[test]
    fn test_nearest_neighbors() {
        let rows = [0.0, 1.0, 5.0, 6.0];
        let nn = nearest_neighbors(&rows, 1, 2);
        assert_eq!(nn[0], vec![1, 2]);
        assert_eq!(nn[3], vec![2, 1]);
    }
}
