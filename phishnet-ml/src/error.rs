//! Error types for the phishnet-ml crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Validate,
    Transform,
    Train,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Validate => "validate",
            Self::Transform => "transform",
            Self::Train => "train",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for pipeline and inference operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Drift detected in {count} column(s): {columns:?}")]
    Drift { count: usize, columns: Vec<String> },

    #[error("Transform fit failed: {0}")]
    TransformFit(String),

    #[error("Quality gate failed: {metric} = {score:.4} is below the minimum {minimum:.4}")]
    QualityGate {
        metric: String,
        score: f64,
        minimum: f64,
    },

    #[error("Model overfits: train {metric} {train:.4} vs test {test:.4} exceeds delta {threshold:.4}")]
    Overfit {
        metric: String,
        train: f64,
        test: f64,
        threshold: f64,
    },

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Failed to load artifact: {0}")]
    ArtifactLoad(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl PipelineError {
    pub fn ingestion(msg: impl Into<String>) -> Self {
        Self::Ingestion(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        Self::TransformFit(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn artifact(msg: impl Into<String>) -> Self {
        Self::ArtifactLoad(msg.into())
    }

    pub fn missing_column(name: impl Into<String>) -> Self {
        Self::MissingColumn(name.into())
    }

    /// Short machine-readable tag, safe to show to end users.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ingestion(_) => "ingestion_failure",
            Self::Validation(_) => "validation_failure",
            Self::SchemaMismatch(_) => "schema_mismatch",
            Self::Drift { .. } => "drift_detected",
            Self::TransformFit(_) => "transform_fit_failure",
            Self::QualityGate { .. } => "quality_gate_failure",
            Self::Overfit { .. } => "overfit",
            Self::Training(_) => "training_failure",
            Self::ArtifactLoad(_) => "artifact_load_failure",
            Self::MissingColumn(_) => "missing_column",
            Self::Config(_) => "config_error",
            Self::Io(_) | Self::Serde(_) | Self::Yaml(_) | Self::Sqlite(_) => "internal_error",
        }
    }

    /// Re-tag a low-level error with the variant owned by `stage`.
    ///
    /// Stage-specific variants pass through unchanged.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Self::Io(_) | Self::Serde(_) | Self::Yaml(_) | Self::Sqlite(_) => {
                let msg = self.to_string();
                match stage {
                    Stage::Ingest => Self::Ingestion(msg),
                    Stage::Validate => Self::Validation(msg),
                    Stage::Transform => Self::TransformFit(msg),
                    Stage::Train => Self::Training(msg),
                }
            }
            other => other,
        }
    }
}

/// A failure tagged with the stage it happened in.
#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

impl StageFailure {
    pub fn new(stage: Stage, error: PipelineError) -> Self {
        Self {
            stage,
            error: error.in_stage(stage),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
