//! Model training: metrics, candidate selection, quality gates.

pub mod metrics;
pub mod trainer;

pub use metrics::{ClassificationMetrics, Metric};
pub use trainer::{ModelTrainer, SelectedModel, check_gates, select_best};
