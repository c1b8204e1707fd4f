//! Random forest: bootstrapped CART trees with per-split feature sampling.

use super::tree::{DecisionTree, GrowParams};
use super::{Classifier, check_training_input, check_width};
use crate::error::PipelineError;
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(n_estimators: usize, max_depth: Option<usize>, seed: u64) -> Self {
        Self {
            n_estimators,
            max_depth,
            seed,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, u8>) -> Result<(), PipelineError> {
        check_training_input(&x, &y)?;
        if self.n_estimators == 0 {
            return Err(PipelineError::training("n_estimators must be at least 1"));
        }
        let n = x.nrows();
        let params = GrowParams {
            max_depth: self.max_depth,
            min_samples_split: 2,
            max_features: Some(((x.ncols() as f64).sqrt().ceil() as usize).max(1)),
        };

        let mut rng = StdRng::seed_from_u64(self.seed);
        self.trees = (0..self.n_estimators)
            .map(|_| {
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::grow(x, y, sample, &params, Some(&mut rng))
            })
            .collect();
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<u8>, PipelineError> {
        check_width(self.name(), &x, self.n_features)?;
        let mut votes = vec![0usize; x.nrows()];
        for tree in &self.trees {
            for (vote, label) in votes.iter_mut().zip(tree.predict(x)?) {
                *vote += usize::from(label);
            }
        }
        Ok(votes
            .into_iter()
            .map(|v| u8::from(v * 2 > self.trees.len()))
            .collect())
    }

    fn name(&self) -> &'static str {
        "random_forest"
    }
}
