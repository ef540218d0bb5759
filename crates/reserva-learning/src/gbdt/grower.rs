//! Leaf-wise tree growth on histogram split finding.
//!
//! The open leaf with the largest split gain is split next, until the tree
//! has `num_leaves` leaves or no leaf can be split. Gains and leaf weights use
//! the second-order objective:
//!
//! ```text
//! gain   = 0.5 * [G_L²/(H_L + λ) + G_R²/(H_R + λ) - G²/(H + λ)]
//! weight = -G / (H + λ)
//! ```

use rayon::prelude::*;

use super::binning::{BinMapper, BinnedMatrix};
use super::tree::Tree;

/// Splits must gain at least this much.
const MIN_GAIN: f64 = 1e-12;

/// Limits and regularization for one tree.
#[derive(Debug, Clone)]
pub struct GrowerParams {
    pub num_leaves: usize,
    /// `None` for unlimited depth.
    pub max_depth: Option<usize>,
    pub min_child_samples: usize,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub learning_rate: f64,
}

impl Default for GrowerParams {
    fn default() -> Self {
        Self {
            num_leaves: 31,
            max_depth: None,
            min_child_samples: 20,
            min_child_weight: 1e-3,
            reg_lambda: 0.0,
            learning_rate: 0.1,
        }
    }
}

impl GrowerParams {
    fn gain(&self, grad_left: f64, hess_left: f64, grad: f64, hess: f64) -> f64 {
        let grad_right = grad - grad_left;
        let hess_right = hess - hess_left;
        let score = |g: f64, h: f64| g * g / (h + self.reg_lambda);
        0.5 * (score(grad_left, hess_left) + score(grad_right, hess_right) - score(grad, hess))
    }

    fn leaf_weight(&self, grad: f64, hess: f64) -> f64 {
        -grad / (hess + self.reg_lambda) * self.learning_rate
    }

    fn can_split(&self, depth: usize, n_rows: usize) -> bool {
        self.max_depth.is_none_or(|max| depth < max) && n_rows >= 2 * self.min_child_samples.max(1)
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
    grad_left: f64,
    hess_left: f64,
}

struct OpenLeaf {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    grad: f64,
    hess: f64,
    best: Option<SplitCandidate>,
}

/// Grows trees over one quantized training matrix.
pub struct TreeGrower<'a> {
    binned: &'a BinnedMatrix,
    mapper: &'a BinMapper,
    params: GrowerParams,
}

impl<'a> TreeGrower<'a> {
    pub fn new(binned: &'a BinnedMatrix, mapper: &'a BinMapper, params: GrowerParams) -> Self {
        Self {
            binned,
            mapper,
            params,
        }
    }

    /// Fit one tree to `grad`/`hess`.
    ///
    /// Returns the tree and each training row's leaf value, so callers can
    /// update their scores without walking the tree.
    pub fn grow(&self, grad: &[f64], hess: &[f64]) -> (Tree, Vec<f64>) {
        let n_rows = self.binned.n_rows();
        let mut tree = Tree::leaf(0.0);

        let root = self.open_leaf(0, (0..n_rows).collect(), 0, grad, hess);
        let mut open = vec![root];
        let mut closed: Vec<OpenLeaf> = Vec::new();

        while open.len() + closed.len() < self.params.num_leaves {
            let pick = open
                .iter()
                .enumerate()
                .filter_map(|(i, leaf)| leaf.best.map(|b| (i, b.gain)))
                .fold(None, |best: Option<(usize, f64)>, (i, gain)| match best {
                    Some((_, top)) if top >= gain => best,
                    _ => Some((i, gain)),
                });
            let Some((index, _)) = pick else {
                break;
            };

            let leaf = open.remove(index);
            let Some(split) = leaf.best else {
                closed.push(leaf);
                continue;
            };

            let column = self.binned.column(split.feature);
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .iter()
                .copied()
                .partition(|&r| column[r] as usize <= split.bin);

            let threshold = self.mapper.threshold(split.feature, split.bin);
            let (left, right) = tree.split(leaf.node, split.feature, threshold, split.gain);

            let depth = leaf.depth + 1;
            open.push(self.open_leaf(left, left_rows, depth, grad, hess));
            open.push(self.open_leaf(right, right_rows, depth, grad, hess));
        }
        closed.extend(open);

        let mut values = vec![0.0; n_rows];
        for leaf in closed {
            let weight = self.params.leaf_weight(leaf.grad, leaf.hess);
            tree.set_leaf_value(leaf.node, weight);
            for &row in &leaf.rows {
                values[row] = weight;
            }
        }
        (tree, values)
    }

    fn open_leaf(
        &self,
        node: usize,
        rows: Vec<usize>,
        depth: usize,
        grad: &[f64],
        hess: &[f64],
    ) -> OpenLeaf {
        let grad_sum: f64 = rows.iter().map(|&r| grad[r]).sum();
        let hess_sum: f64 = rows.iter().map(|&r| hess[r]).sum();
        let best = if self.params.can_split(depth, rows.len()) {
            self.best_split(&rows, grad, hess, grad_sum, hess_sum)
        } else {
            None
        };
        OpenLeaf {
            node,
            rows,
            depth,
            grad: grad_sum,
            hess: hess_sum,
            best,
        }
    }

    /// Best split of `rows` over all features; ties go to the lower feature.
    fn best_split(
        &self,
        rows: &[usize],
        grad: &[f64],
        hess: &[f64],
        grad_sum: f64,
        hess_sum: f64,
    ) -> Option<SplitCandidate> {
        let per_feature: Vec<Option<SplitCandidate>> = (0..self.binned.n_features())
            .into_par_iter()
            .map(|feature| self.best_feature_split(feature, rows, grad, hess, grad_sum, hess_sum))
            .collect();

        per_feature
            .into_iter()
            .flatten()
            .fold(None, |best: Option<SplitCandidate>, candidate| match best {
                Some(top) if top.gain >= candidate.gain => best,
                _ => Some(candidate),
            })
    }

    fn best_feature_split(
        &self,
        feature: usize,
        rows: &[usize],
        grad: &[f64],
        hess: &[f64],
        grad_sum: f64,
        hess_sum: f64,
    ) -> Option<SplitCandidate> {
        let n_bins = self.mapper.n_bins(feature);
        if n_bins < 2 {
            return None;
        }

        let column = self.binned.column(feature);
        let mut hist_grad = vec![0.0; n_bins];
        let mut hist_hess = vec![0.0; n_bins];
        let mut hist_count = vec![0usize; n_bins];
        for &row in rows {
            let bin = column[row] as usize;
            hist_grad[bin] += grad[row];
            hist_hess[bin] += hess[row];
            hist_count[bin] += 1;
        }

        let params = &self.params;
        let min_samples = params.min_child_samples.max(1);
        let (mut grad_left, mut hess_left, mut count_left) = (0.0, 0.0, 0usize);
        let mut best: Option<SplitCandidate> = None;

        for bin in 0..n_bins - 1 {
            grad_left += hist_grad[bin];
            hess_left += hist_hess[bin];
            count_left += hist_count[bin];
            let count_right = rows.len() - count_left;

            if count_left < min_samples || hess_left < params.min_child_weight {
                continue;
            }
            if count_right < min_samples || hess_sum - hess_left < params.min_child_weight {
                break;
            }

            let gain = params.gain(grad_left, hess_left, grad_sum, hess_sum);
            if gain > MIN_GAIN && best.is_none_or(|b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    bin,
                    gain,
                    grad_left,
                    hess_left,
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::binning::MAX_BIN;
    use ndarray::Array2;

    fn step_data() -> (Array2<f64>, Vec<f64>, Vec<f64>) {
        // feature 1 separates the gradients; feature 0 is noise
        let x = Array2::from_shape_fn((100, 2), |(i, j)| {
            if j == 0 { ((i * 37) % 11) as f64 } else { i as f64 }
        });
        let grad: Vec<f64> = (0..100).map(|i| if i < 50 { -0.5 } else { 0.5 }).collect();
        let hess = vec![0.25; 100];
        (x, grad, hess)
    }

    #[test]
    fn test_finds_separating_feature() {
        let (x, grad, hess) = step_data();
        let mapper = BinMapper::fit(x.view(), MAX_BIN);
        let binned = mapper.transform(x.view());
        let params = GrowerParams {
            num_leaves: 2,
            min_child_samples: 5,
            learning_rate: 1.0,
            ..GrowerParams::default()
        };

        let (tree, values) = TreeGrower::new(&binned, &mapper, params).grow(&grad, &hess);

        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.predict(&[0.0, 10.0]), 2.0);
        assert_eq!(tree.predict(&[0.0, 90.0]), -2.0);
        assert_eq!(values[0], 2.0);
        assert_eq!(values[99], -2.0);
    }

    #[test]
    fn test_respects_leaf_and_depth_limits() {
        let (x, _, hess) = step_data();
        let grad: Vec<f64> = (0..100).map(|i| ((i % 7) as f64 - 3.0) / 3.0).collect();
        let mapper = BinMapper::fit(x.view(), MAX_BIN);
        let binned = mapper.transform(x.view());

        let params = GrowerParams {
            num_leaves: 6,
            max_depth: Some(2),
            min_child_samples: 2,
            ..GrowerParams::default()
        };
        let (tree, _) = TreeGrower::new(&binned, &mapper, params).grow(&grad, &hess);

        assert!(tree.n_leaves() <= 4);
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn test_min_child_samples_blocks_split() {
        let (x, grad, hess) = step_data();
        let mapper = BinMapper::fit(x.view(), MAX_BIN);
        let binned = mapper.transform(x.view());
        let params = GrowerParams {
            min_child_samples: 60,
            ..GrowerParams::default()
        };

        let (tree, _) = TreeGrower::new(&binned, &mapper, params).grow(&grad, &hess);
        assert_eq!(tree.n_leaves(), 1);
    }
}
