//! Classification metrics and the selection metric.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric used to rank candidates and drive the quality gates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    F1,
    Accuracy,
    Precision,
    Recall,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F1 => "f1",
            Self::Accuracy => "accuracy",
            Self::Precision => "precision",
            Self::Recall => "recall",
        }
    }

    pub fn score(&self, metrics: &ClassificationMetrics) -> f64 {
        match self {
            Self::F1 => metrics.f1_score,
            Self::Accuracy => metrics.accuracy,
            Self::Precision => metrics.precision,
            Self::Recall => metrics.recall,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary classification metrics with phishing (`1`) as the positive class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// `[[tn, fp], [fn, tp]]`
    pub confusion_matrix: [[usize; 2]; 2],
    pub support: usize,
}

impl ClassificationMetrics {
    /// Compare predictions to ground truth. Zero denominators score `0.0`.
    ///
    /// Only the shorter of the two slices is considered.
    pub fn compute(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut cm = [[0usize; 2]; 2];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            cm[usize::from(t == 1)][usize::from(p == 1)] += 1;
        }
        let [[tn, fp], [fn_, tp]] = cm;
        let support = tn + fp + fn_ + tp;

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Self {
            accuracy: ratio(tp + tn, support),
            precision,
            recall,
            f1_score,
            confusion_matrix: cm,
            support,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compute_metrics() {
        let m = ClassificationMetrics::compute(&[1, 1, 0, 0, 1], &[1, 0, 0, 1, 1]);
        assert_eq!(m.confusion_matrix, [[1, 1], [1, 2]]);
        assert_eq!(m.accuracy, 0.6);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1_score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_division_scores_zero() {
        let m = ClassificationMetrics::compute(&[0, 0], &[0, 0]);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1_score, 0.0);
    }

    #[test]
    fn test_metric_selection_and_serde() {
        let m = ClassificationMetrics::compute(&[1, 0], &[1, 1]);
        assert_eq!(Metric::Precision.score(&m), 0.5);
        assert_eq!(Metric::Recall.score(&m), 1.0);
        assert_eq!(serde_json::to_string(&Metric::F1).unwrap(), "\"f1\"");
        assert_eq!(Metric::default(), Metric::F1);
    }
}
