//! Regression trees fitted to gradients.

use serde::{Deserialize, Serialize};

/// One node of a [`Tree`]; children are indices into the same arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        /// Rows with `value <= threshold` go left.
        threshold: f64,
        gain: f64,
        left: usize,
        right: usize,
    },
}

/// A binary tree stored as a flat node arena; node `0` is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::leaf(0.0)
    }
}

impl Tree {
    /// A tree with a single leaf.
    pub fn leaf(value: f64) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    /// Turn leaf `node` into a split with two zero-valued leaves.
    ///
    /// Returns the indices of the new left and right leaves.
    pub(crate) fn split(
        &mut self,
        node: usize,
        feature: usize,
        threshold: f64,
        gain: f64,
    ) -> (usize, usize) {
        let left = self.nodes.len();
        let right = left + 1;
        self.nodes.push(Node::Leaf { value: 0.0 });
        self.nodes.push(Node::Leaf { value: 0.0 });
        self.nodes[node] = Node::Split {
            feature,
            threshold,
            gain,
            left,
            right,
        };
        (left, right)
    }

    pub(crate) fn set_leaf_value(&mut self, node: usize, value: f64) {
        if let Node::Leaf { value: slot } = &mut self.nodes[node] {
            *slot = value;
        }
    }

    /// Raw score contribution for one row.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut current = 0;
        loop {
            match &self.nodes[current] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    current = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Longest root-to-leaf path, counted in splits.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            match &self.nodes[node] {
                Node::Leaf { .. } => deepest = deepest.max(depth),
                Node::Split { left, right, .. } => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
            }
        }
        deepest
    }
}
