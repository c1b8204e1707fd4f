//! CART decision tree with Gini impurity.

use super::{Classifier, check_training_input, check_width};
use crate::error::PipelineError;
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Node of a fitted tree, stored in a flat arena. Index 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        class: u8,
        samples: usize,
    },
    Split {
        feature: usize,
        /// Rows with `x[feature] <= threshold` go left.
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    n_features: usize,
    nodes: Vec<Node>,
}

/// Limits applied while growing one tree.
pub(crate) struct GrowParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Features considered per split; `None` means all of them.
    pub max_features: Option<usize>,
}

impl DecisionTree {
    pub fn new(max_depth: Option<usize>, min_samples_split: usize) -> Self {
        Self {
            max_depth,
            min_samples_split,
            n_features: 0,
            nodes: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Grow on the rows at `indices`, drawing feature subsets from `rng` when
    /// `params.max_features` is set.
    pub(crate) fn grow(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, u8>,
        indices: Vec<usize>,
        params: &GrowParams,
        mut rng: Option<&mut StdRng>,
    ) -> Self {
        let mut tree = Self::new(params.max_depth, params.min_samples_split);
        tree.n_features = x.ncols();
        let mut stack = vec![(indices, 0usize, 0usize)];
        tree.nodes.push(leaf(&y, &[]));

        while let Some((rows, depth, slot)) = stack.pop() {
            let split = if rows.len() >= params.min_samples_split.max(2)
                && params.max_depth.is_none_or(|d| depth < d)
            {
                let features =
                    candidate_features(x.ncols(), params.max_features, rng.as_deref_mut());
                // A sampled subset of constant features falls back to all of them.
                best_split(&x, &y, &rows, &features).or_else(|| {
                    if features.len() < x.ncols() {
                        let all: Vec<usize> = (0..x.ncols()).collect();
                        best_split(&x, &y, &rows, &all)
                    } else {
                        None
                    }
                })
            } else {
                None
            };

            match split {
                Some((feature, threshold)) => {
                    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                        rows.iter().partition(|&&r| x[[r, feature]] <= threshold);
                    let left = tree.nodes.len();
                    let right = left + 1;
                    tree.nodes.push(leaf(&y, &left_rows));
                    tree.nodes.push(leaf(&y, &right_rows));
                    tree.nodes[slot] = Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    };
                    stack.push((right_rows, depth + 1, right));
                    stack.push((left_rows, depth + 1, left));
                }
                None => tree.nodes[slot] = leaf(&y, &rows),
            }
        }
        tree
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> u8 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { class, .. } => return *class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, u8>) -> Result<(), PipelineError> {
        check_training_input(&x, &y)?;
        let params = GrowParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            max_features: None,
        };
        *self = Self::grow(x, y, (0..x.nrows()).collect(), &params, None);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<u8>, PipelineError> {
        check_width(self.name(), &x, self.n_features)?;
        Ok(x.rows().into_iter().map(|row| self.predict_row(row)).collect())
    }

    fn name(&self) -> &'static str {
        "decision_tree"
    }
}

fn leaf(y: &ArrayView1<'_, u8>, rows: &[usize]) -> Node {
    let positives = rows.iter().filter(|&&r| y[r] == 1).count();
    Node::Leaf {
        class: u8::from(positives * 2 > rows.len()),
        samples: rows.len(),
    }
}

fn candidate_features(
    n_features: usize,
    max_features: Option<usize>,
    rng: Option<&mut StdRng>,
) -> Vec<usize> {
    let mut features: Vec<usize> = (0..n_features).collect();
    if let (Some(k), Some(rng)) = (max_features, rng) {
        if k < n_features {
            features.shuffle(rng);
            features.truncate(k.max(1));
            features.sort_unstable();
        }
    }
    features
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

/// Lowest weighted-Gini split over `features`, thresholds at midpoints of
/// distinct sorted values. `None` for a pure node or when every candidate
/// feature is constant.
fn best_split(
    x: &ArrayView2<'_, f64>,
    y: &ArrayView1<'_, u8>,
    rows: &[usize],
    features: &[usize],
) -> Option<(usize, f64)> {
    let total = rows.len();
    let total_pos = rows.iter().filter(|&&r| y[r] == 1).count();
    let parent = gini(total_pos, total);
    if parent == 0.0 {
        return None;
    }

    let mut best: Option<(f64, usize, f64)> = None;
    let mut sorted = rows.to_vec();
    for &feature in features {
        sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
        let mut left_pos = 0usize;
        for i in 0..total - 1 {
            let r = sorted[i];
            left_pos += usize::from(y[r] == 1);
            let (here, next) = (x[[r, feature]], x[[sorted[i + 1], feature]]);
            if here == next {
                continue;
            }
            let left_n = i + 1;
            let right_n = total - left_n;
            let impurity = (left_n as f64 * gini(left_pos, left_n)
                + right_n as f64 * gini(total_pos - left_pos, right_n))
                / total as f64;
            if best.is_none_or(|(b, _, _)| impurity < b) {
                best = Some((impurity, feature, (here + next) / 2.0));
            }
        }
    }

    best.map(|(_, feature, threshold)| (feature, threshold))
}
