//! Feature quantization.
//!
//! Each feature gets a sorted list of cut values. A value falls in bin `b`
//! when `cuts[b - 1] < value <= cuts[b]`, so "bin `<= b`" on the quantized
//! matrix is the same test as "value `<= cuts[b]`" on raw data, and trained
//! trees can carry real thresholds.

use ndarray::{ArrayView1, ArrayView2, Axis};

/// Most bins any feature can have; keeps bin indices within a `u8`.
pub const MAX_BIN: usize = 255;

// ============================================================================
// BinMapper
// ============================================================================

/// Cut values for every feature, learned from training data.
#[derive(Debug, Clone, PartialEq)]
pub struct BinMapper {
    cuts: Vec<Vec<f64>>,
}

impl BinMapper {
    /// Learn up to `max_bin` bins per column of `x`.
    ///
    /// Columns with few distinct values get one bin per value; the rest get
    /// cuts at evenly spaced quantiles.
    pub fn fit(x: ArrayView2<f64>, max_bin: usize) -> Self {
        let max_bin = max_bin.clamp(2, MAX_BIN);
        let cuts = x
            .axis_iter(Axis(1))
            .map(|column| feature_cuts(column, max_bin))
            .collect();
        Self { cuts }
    }

    pub fn n_features(&self) -> usize {
        self.cuts.len()
    }

    /// Number of bins for `feature`.
    pub fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }

    /// Upper bound of `bin`; the split threshold for "bin <= `bin`".
    pub fn threshold(&self, feature: usize, bin: usize) -> f64 {
        self.cuts[feature][bin]
    }

    #[inline]
    pub fn bin(&self, feature: usize, value: f64) -> u8 {
        self.cuts[feature].partition_point(|&cut| cut < value) as u8
    }

    /// Quantize `x` column by column.
    pub fn transform(&self, x: ArrayView2<f64>) -> BinnedMatrix {
        let n_rows = x.nrows();
        let columns = x
            .axis_iter(Axis(1))
            .enumerate()
            .map(|(feature, column)| column.iter().map(|&v| self.bin(feature, v)).collect())
            .collect();
        BinnedMatrix { columns, n_rows }
    }
}

fn feature_cuts(column: ArrayView1<f64>, max_bin: usize) -> Vec<f64> {
    let mut values: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
    values.sort_by(f64::total_cmp);
    let mut distinct = values.clone();
    distinct.dedup();

    if distinct.len() <= 1 {
        return Vec::new();
    }

    if distinct.len() <= max_bin {
        return distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    }

    // quantile cuts, snapped to midpoints between neighbouring distinct values
    let n = values.len();
    let mut cuts: Vec<f64> = (1..max_bin)
        .map(|q| {
            let upper = values[(q * n / max_bin).min(n - 1)];
            let at = distinct.partition_point(|&d| d < upper);
            if at == 0 {
                distinct[0]
            } else {
                (distinct[at - 1] + distinct[at]) / 2.0
            }
        })
        .collect();
    cuts.dedup();
    cuts
}

// ============================================================================
// BinnedMatrix
// ============================================================================

/// Column-major bin indices.
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    columns: Vec<Vec<u8>>,
    n_rows: usize,
}

impl BinnedMatrix {
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn column(&self, feature: usize) -> &[u8] {
        &self.columns[feature]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_few_distinct_values_get_midpoints() {
        let x = array![[1.0], [2.0], [2.0], [4.0]];
        let mapper = BinMapper::fit(x.view(), MAX_BIN);

        assert_eq!(mapper.n_bins(0), 3);
        assert_eq!(mapper.threshold(0, 0), 1.5);
        assert_eq!(mapper.threshold(0, 1), 3.0);
        assert_eq!(mapper.bin(0, 1.0), 0);
        assert_eq!(mapper.bin(0, 2.0), 1);
        assert_eq!(mapper.bin(0, 100.0), 2);
    }

    #[test]
    fn test_bins_agree_with_thresholds() {
        let x = ndarray::Array2::from_shape_fn((1000, 1), |(i, _)| (i * i % 997) as f64);
        let mapper = BinMapper::fit(x.view(), 16);
        let binned = mapper.transform(x.view());

        assert!(mapper.n_bins(0) <= 16);
        for (row, &b) in binned.column(0).iter().enumerate() {
            let value = x[[row, 0]];
            if (b as usize) < mapper.n_bins(0) - 1 {
                assert!(value <= mapper.threshold(0, b as usize));
            }
            if b > 0 {
                assert!(value > mapper.threshold(0, b as usize - 1));
            }
        }
    }

    #[test]
    fn test_constant_column_has_one_bin() {
        let x = array![[3.0, 1.0], [3.0, 2.0]];
        let mapper = BinMapper::fit(x.view(), MAX_BIN);
        assert_eq!(mapper.n_bins(0), 1);
        assert_eq!(mapper.transform(x.view()).column(0), &[0, 0]);
    }
}
