//! Artifacts handed from one pipeline stage to the next.
//!
//! Each artifact only carries locations inside the run workspace plus small
//! summaries; the next stage reads the files it points at.

use crate::data::source::SourceInfo;
use crate::data::validate::ValidationReport;
use crate::training::metrics::ClassificationMetrics;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataIngestionArtifact {
    pub feature_store_file: PathBuf,
    pub train_file: PathBuf,
    pub test_file: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
    pub source: SourceInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataValidationArtifact {
    pub passed: bool,
    /// Label column declared by the schema.
    pub target_column: String,
    pub valid_train_file: Option<PathBuf>,
    pub valid_test_file: Option<PathBuf>,
    pub invalid_train_file: Option<PathBuf>,
    pub invalid_test_file: Option<PathBuf>,
    pub drift_report_file: PathBuf,
    pub report: ValidationReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTransformationArtifact {
    pub preprocessor_file: PathBuf,
    pub transformed_train_file: PathBuf,
    pub transformed_test_file: PathBuf,
    pub feature_count: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTrainerArtifact {
    /// Bundle inside the run workspace.
    pub model_file: PathBuf,
    /// Deployed copy read by serving.
    pub deployed_model_file: PathBuf,
    pub model_name: String,
    pub train_metrics: ClassificationMetrics,
    pub test_metrics: ClassificationMetrics,
    /// Set when the overfit check tripped under the `flag` policy.
    pub overfit_flagged: bool,
}
