//! Classifier family trained by the model trainer.

pub mod forest;
pub mod logistic;
pub mod tree;

pub use forest::RandomForest;
pub use logistic::LogisticRegression;
pub use tree::DecisionTree;

use crate::error::PipelineError;
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// A binary classifier over dense feature matrices.
///
/// Labels are `0` (legitimate) or `1` (phishing).
pub trait Classifier {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, u8>) -> Result<(), PipelineError>;

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<u8>, PipelineError>;

    fn name(&self) -> &'static str;
}

/// A candidate algorithm with its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum Algorithm {
    LogisticRegression {
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        #[serde(default = "default_epochs")]
        epochs: usize,
        #[serde(default = "default_l2")]
        l2: f64,
    },
    DecisionTree {
        #[serde(default = "default_max_depth")]
        max_depth: Option<usize>,
        #[serde(default = "default_min_samples_split")]
        min_samples_split: usize,
    },
    RandomForest {
        #[serde(default = "default_n_estimators")]
        n_estimators: usize,
        #[serde(default = "default_max_depth")]
        max_depth: Option<usize>,
        #[serde(default = "default_forest_seed")]
        seed: u64,
    },
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_epochs() -> usize {
    500
}

fn default_l2() -> f64 {
    1e-4
}

fn default_max_depth() -> Option<usize> {
    Some(10)
}

fn default_min_samples_split() -> usize {
    2
}

fn default_n_estimators() -> usize {
    50
}

fn default_forest_seed() -> u64 {
    42
}

impl Algorithm {
    pub fn default_logistic_regression() -> Self {
        Self::LogisticRegression {
            learning_rate: default_learning_rate(),
            epochs: default_epochs(),
            l2: default_l2(),
        }
    }

    pub fn default_decision_tree() -> Self {
        Self::DecisionTree {
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
        }
    }

    pub fn default_random_forest() -> Self {
        Self::RandomForest {
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            seed: default_forest_seed(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::LogisticRegression { .. } => "logistic_regression",
            Self::DecisionTree { .. } => "decision_tree",
            Self::RandomForest { .. } => "random_forest",
        }
    }

    /// Fit a fresh model of this kind.
    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, u8>,
    ) -> Result<TrainedModel, PipelineError> {
        let mut model = match self {
            Self::LogisticRegression {
                learning_rate,
                epochs,
                l2,
            } => TrainedModel::LogisticRegression(LogisticRegression::new(
                *learning_rate,
                *epochs,
                *l2,
            )),
            Self::DecisionTree {
                max_depth,
                min_samples_split,
            } => TrainedModel::DecisionTree(DecisionTree::new(*max_depth, *min_samples_split)),
            Self::RandomForest {
                n_estimators,
                max_depth,
                seed,
            } => TrainedModel::RandomForest(RandomForest::new(*n_estimators, *max_depth, *seed)),
        };
        model.fit(x, y)?;
        Ok(model)
    }
}

/// A fitted model of any supported kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedModel {
    LogisticRegression(LogisticRegression),
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
}

impl Classifier for TrainedModel {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, u8>) -> Result<(), PipelineError> {
        match self {
            Self::LogisticRegression(m) => m.fit(x, y),
            Self::DecisionTree(m) => m.fit(x, y),
            Self::RandomForest(m) => m.fit(x, y),
        }
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<u8>, PipelineError> {
        match self {
            Self::LogisticRegression(m) => m.predict(x),
            Self::DecisionTree(m) => m.predict(x),
            Self::RandomForest(m) => m.predict(x),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::LogisticRegression(m) => m.name(),
            Self::DecisionTree(m) => m.name(),
            Self::RandomForest(m) => m.name(),
        }
    }
}

/// Shared checks on training input.
pub(crate) fn check_training_input(
    x: &ArrayView2<'_, f64>,
    y: &ArrayView1<'_, u8>,
) -> Result<(), PipelineError> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(PipelineError::training(format!(
            "empty training matrix {:?}",
            x.dim()
        )));
    }
    if x.nrows() != y.len() {
        return Err(PipelineError::training(format!(
            "{} rows but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    if y.iter().any(|&label| label > 1) {
        return Err(PipelineError::training("labels must be 0 or 1"));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::training("training matrix has non-finite values"));
    }
    Ok(())
}

/// Shared check on prediction input.
pub(crate) fn check_width(
    name: &str,
    x: &ArrayView2<'_, f64>,
    fitted: usize,
) -> Result<(), PipelineError> {
    if fitted == 0 {
        return Err(PipelineError::training(format!("{name} is not fitted")));
    }
    if x.ncols() != fitted {
        return Err(PipelineError::training(format!(
            "{name} expects {fitted} features, got {}",
            x.ncols()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};

    #[test]
    fn test_algorithm_serde_tags() {
        let json = serde_json::to_value(Algorithm::default_random_forest()).unwrap();
        assert_eq!(json["algorithm"], "random_forest");

        let parsed: Algorithm =
            serde_json::from_str(r#"{"algorithm": "decision_tree", "max_depth": 3}"#).unwrap();
        assert_eq!(
            parsed,
            Algorithm::DecisionTree {
                max_depth: Some(3),
                min_samples_split: 2
            }
        );
    }

    #[test]
    fn test_every_candidate_learns_a_single_threshold() {
        let x = array![[-1.0, 0.0], [-1.0, 1.0], [1.0, 0.0], [1.0, 1.0], [-1.0, 0.0], [1.0, 1.0]];
        let y = Array1::from(vec![0u8, 0, 1, 1, 0, 1]);
        for algo in [
            Algorithm::default_logistic_regression(),
            Algorithm::default_decision_tree(),
            Algorithm::default_random_forest(),
        ] {
            let model = algo.fit(x.view(), y.view()).unwrap();
            assert_eq!(model.name(), algo.name());
            assert_eq!(model.predict(x.view()).unwrap(), y.to_vec(), "{}", algo.name());
        }
    }

    #[test]
    fn test_rejects_bad_labels() {
        let x = array![[0.0], [1.0]];
        let y = Array1::from(vec![0u8, 2]);
        assert!(Algorithm::default_decision_tree().fit(x.view(), y.view()).is_err());
    }

    #[test]
    fn test_trained_model_roundtrips_through_json() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [0.2, 0.9], [0.9, 0.1]];
        let y = Array1::from(vec![0u8, 1, 0, 1]);
        let model = Algorithm::default_logistic_regression()
            .fit(x.view(), y.view())
            .unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let back: TrainedModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
        assert_eq!(back.predict(x.view()).unwrap(), model.predict(x.view()).unwrap());
    }
}
