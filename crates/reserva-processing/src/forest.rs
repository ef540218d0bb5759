//! Random forest classifier used to rank features.
//!
//! CART trees split on gini impurity; each tree is grown on a bootstrap
//! sample and considers `sqrt(p)` random features per split. Feature
//! importance is the mean decrease in impurity, normalised per tree and then
//! averaged over the forest.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use reserva_common::{PipelineError, Result};
use tracing::debug;

/// Forest hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestConfig {
    pub n_estimators: usize,
    /// Unlimited when `None`.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single CART tree, stored as an arena of nodes rooted at index 0.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

fn majority_class(counts: &[usize]) -> usize {
    counts
        .iter()
        .enumerate()
        .fold((0, 0), |best, (class, &count)| {
            if count > best.1 { (class, count) } else { best }
        })
        .0
}

impl DecisionTree {
    /// Grow a tree on the rows in `sample` (duplicates allowed).
    fn fit(
        columns: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        sample: Vec<usize>,
        max_features: usize,
        config: &ForestConfig,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = columns.len();
        let mut nodes = vec![Node::Leaf { class: 0 }];
        let mut importances = vec![0.0; n_features];
        let mut stack = vec![(0usize, sample, 0usize)];

        while let Some((node, rows, depth)) = stack.pop() {
            let mut counts = vec![0usize; n_classes];
            for &i in &rows {
                counts[y[i]] += 1;
            }
            let impurity = gini(&counts, rows.len());

            let depth_left = config.max_depth.is_none_or(|max| depth < max);
            let split = if depth_left && rows.len() >= config.min_samples_split && impurity > 0.0 {
                best_split(columns, y, n_classes, &rows, &counts, max_features, rng)
            } else {
                None
            };

            let Some(split) = split else {
                nodes[node] = Node::Leaf {
                    class: majority_class(&counts),
                };
                continue;
            };

            importances[split.feature] += split.decrease;
            let column = &columns[split.feature];
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                rows.iter().copied().partition(|&i| column[i] <= split.threshold);

            let left = nodes.len();
            nodes.push(Node::Leaf { class: 0 });
            let right = nodes.len();
            nodes.push(Node::Leaf { class: 0 });
            nodes[node] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            stack.push((right, right_rows, depth + 1));
            stack.push((left, left_rows, depth + 1));
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        Self { nodes, importances }
    }

    pub fn predict(&self, row: &[f64]) -> usize {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { class } => return *class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Best gini split over randomly drawn features.
///
/// Features are visited in random order until `max_features` non-constant
/// ones have been tried; if none of them yields a split the search carries
/// on through the remaining features.
fn best_split(
    columns: &[Vec<f64>],
    y: &[usize],
    n_classes: usize,
    rows: &[usize],
    parent_counts: &[usize],
    max_features: usize,
    rng: &mut StdRng,
) -> Option<SplitCandidate> {
    let n = rows.len();
    let parent = n as f64 * gini(parent_counts, n);

    let mut order: Vec<usize> = (0..columns.len()).collect();
    order.shuffle(rng);

    let mut best: Option<SplitCandidate> = None;
    let mut visited = 0;
    let mut pairs: Vec<(f64, usize)> = Vec::with_capacity(n);

    for feature in order {
        if visited >= max_features && best.is_some() {
            break;
        }

        pairs.clear();
        pairs.extend(rows.iter().map(|&i| (columns[feature][i], y[i])));
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        if pairs[0].0 == pairs[n - 1].0 {
            continue;
        }
        visited += 1;

        let mut left = vec![0usize; n_classes];
        let mut right = parent_counts.to_vec();
        for i in 0..n - 1 {
            let (value, class) = pairs[i];
            left[class] += 1;
            right[class] -= 1;

            let next = pairs[i + 1].0;
            if value == next {
                continue;
            }

            let n_left = i + 1;
            let n_right = n - n_left;
            let decrease = parent
                - n_left as f64 * gini(&left, n_left)
                - n_right as f64 * gini(&right, n_right);

            if decrease > 1e-12 && best.as_ref().is_none_or(|b| decrease > b.decrease) {
                let mut threshold = value + (next - value) / 2.0;
                if threshold >= next {
                    threshold = value;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    decrease,
                });
            }
        }
    }

    best
}

/// Bagged ensemble of [`DecisionTree`]s.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    n_classes: usize,
}

impl RandomForest {
    /// Fit on column-major features and class indices `0..n_classes`.
    ///
    /// Trees are grown in parallel; each tree's RNG is derived from the
    /// configured seed and its index, so results do not depend on scheduling.
    pub fn fit(columns: &[Vec<f64>], y: &[usize], config: &ForestConfig) -> Result<Self> {
        let n_features = columns.len();
        let n_rows = y.len();
        if n_features == 0 || n_rows == 0 {
            return Err(PipelineError::InvalidData(
                "random forest needs at least one feature and one row".to_string(),
            ));
        }
        if columns.iter().any(|c| c.len() != n_rows) {
            return Err(PipelineError::InvalidData(
                "feature columns and labels differ in length".to_string(),
            ));
        }
        if config.n_estimators == 0 {
            return Err(PipelineError::InvalidConfig(
                "random forest needs at least one tree".to_string(),
            ));
        }

        let n_classes = y.iter().copied().max().unwrap_or(0) + 1;
        let max_features = ((n_features as f64).sqrt().floor() as usize).max(1);
        debug!(
            "Fitting {} trees on {} rows x {} features ({} per split)",
            config.n_estimators, n_rows, n_features, max_features
        );

        let trees = (0..config.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
                let sample: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
                DecisionTree::fit(
                    columns,
                    y,
                    n_classes,
                    sample,
                    max_features,
                    config,
                    &mut rng,
                )
            })
            .collect();

        Ok(Self {
            trees,
            n_features,
            n_classes,
        })
    }

    /// Mean decrease in impurity per feature, summing to 1 unless every tree
    /// is a single leaf.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (total, value) in totals.iter_mut().zip(&tree.importances) {
                *total += value;
            }
        }

        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }

    /// Majority vote of the trees.
    pub fn predict(&self, row: &[f64]) -> usize {
        let mut votes = vec![0usize; self.n_classes];
        for tree in &self.trees {
            votes[tree.predict(row)] += 1;
        }
        majority_class(&votes)
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_gini() {
        assert_close(gini(&[5, 5], 10), 0.5);
        assert_close(gini(&[10, 0], 10), 0.0);
        assert_close(gini(&[], 0), 0.0);
    }

    #[test]
    fn test_informative_feature_dominates() {
        let mut rng = StdRng::seed_from_u64(0);
        let n = 400;
        let signal: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let noise_a: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();
        let noise_b: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();
        let y: Vec<usize> = (0..n).map(|i| usize::from(i >= n / 2)).collect();

        let forest = RandomForest::fit(
            &[noise_a, signal, noise_b],
            &y,
            &ForestConfig {
                n_estimators: 25,
                ..ForestConfig::default()
            },
        )
        .unwrap();

        let importances = forest.feature_importances();
        assert_close(importances.iter().sum::<f64>(), 1.0);
        assert!(importances[1] > importances[0]);
        assert!(importances[1] > importances[2]);
        assert!(importances[1] > 0.5);
    }

    #[test]
    fn test_forest_separates_classes() {
        let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let y: Vec<usize> = (0..100).map(|i| usize::from(i >= 50)).collect();
        let forest = RandomForest::fit(&[x], &y, &ForestConfig::default()).unwrap();

        assert_eq!(forest.predict(&[5.0]), 0);
        assert_eq!(forest.predict(&[95.0]), 1);
        assert_eq!(forest.trees().len(), 100);
    }

    #[test]
    fn test_seeded_forests_agree() {
        let x: Vec<f64> = (0..60).map(|i| ((i * 37) % 60) as f64).collect();
        let z: Vec<f64> = (0..60).map(|i| ((i * 11) % 7) as f64).collect();
        let y: Vec<usize> = (0..60).map(|i| i % 3).collect();
        let config = ForestConfig {
            n_estimators: 10,
            ..ForestConfig::default()
        };

        let a = RandomForest::fit(&[x.clone(), z.clone()], &y, &config).unwrap();
        let b = RandomForest::fit(&[x, z], &y, &config).unwrap();
        assert_eq!(a.feature_importances(), b.feature_importances());
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let x: Vec<f64> = (0..64).map(|i| i as f64).collect();
        let y: Vec<usize> = (0..64).map(|i| i % 2).collect();
        let config = ForestConfig {
            n_estimators: 1,
            max_depth: Some(2),
            ..ForestConfig::default()
        };

        let forest = RandomForest::fit(&[x], &y, &config).unwrap();
        assert!(forest.trees()[0].n_nodes() <= 7);
    }

    #[test]
    fn test_rejects_empty_input() {
        let err = RandomForest::fit(&[], &[], &ForestConfig::default()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");
    }
}
