//! Binary logistic regression trained with full-batch gradient descent.

use super::{Classifier, check_training_input, check_width};
use crate::error::PipelineError;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
    /// Per-feature standardization learned at fit time.
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticRegression {
    pub fn new(learning_rate: f64, epochs: usize, l2: f64) -> Self {
        Self {
            learning_rate,
            epochs,
            l2,
            means: Vec::new(),
            scales: Vec::new(),
            weights: Vec::new(),
            bias: 0.0,
        }
    }

    /// Probability of the phishing class for each row.
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Vec<f64>, PipelineError> {
        check_width(self.name(), &x, self.weights.len())?;
        let weights = Array1::from(self.weights.clone());
        let standardized = self.standardize(x);
        Ok(standardized
            .dot(&weights)
            .iter()
            .map(|z| sigmoid(z + self.bias))
            .collect())
    }

    fn standardize(&self, x: ArrayView2<'_, f64>) -> ndarray::Array2<f64> {
        let mut out = x.to_owned();
        for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, scale) = (self.means[j], self.scales[j]);
            col.mapv_inplace(|v| (v - mean) / scale);
        }
        out
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, u8>) -> Result<(), PipelineError> {
        check_training_input(&x, &y)?;
        let n = x.nrows() as f64;

        self.means = x
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .ok_or_else(|| PipelineError::training("empty training matrix"))?;
        self.scales = x
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|&s| if s > 0.0 { s } else { 1.0 })
            .collect();

        let xs = self.standardize(x);
        let target = y.mapv(f64::from);
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;

        for _ in 0..self.epochs {
            let residual = (xs.dot(&weights) + bias).mapv(sigmoid) - &target;
            let grad_w = xs.t().dot(&residual) / n + &weights * self.l2;
            let grad_b = residual.sum() / n;
            weights = weights - grad_w * self.learning_rate;
            bias -= grad_b * self.learning_rate;
        }

        self.weights = weights.to_vec();
        self.bias = bias;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<u8>, PipelineError> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| u8::from(p >= 0.5))
            .collect())
    }

    fn name(&self) -> &'static str {
        "logistic_regression"
    }
}
