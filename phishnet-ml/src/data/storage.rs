//! Per-run workspace layout and content hashing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Timestamp format of run directory names.
pub const RUN_TIMESTAMP_FORMAT: &str = "%m_%d_%Y_%H_%M_%S";

/// Directory tree of one pipeline run.
///
/// ```text
/// <artifact_dir>/<timestamp>_<run id prefix>/
///   data_ingestion/{feature_store,ingested}/
///   data_validation/{validated,invalid,drift_report}/
///   data_transformation/{transformed,transformed_object}/
///   model_trainer/trained_model/
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWorkspace {
    pub run_id: String,
    pub root: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl RunWorkspace {
    /// Workspace for a run starting now.
    pub fn new(artifact_dir: &Path) -> Self {
        Self::at(artifact_dir, Utc::now())
    }

    pub fn at(artifact_dir: &Path, started_at: DateTime<Utc>) -> Self {
        Self::with_run_id(artifact_dir, started_at, uuid::Uuid::new_v4().to_string())
    }

    /// Runs started within the same second still get distinct directories:
    /// the name carries the first block of the run id.
    pub fn with_run_id(artifact_dir: &Path, started_at: DateTime<Utc>, run_id: String) -> Self {
        let prefix = run_id.split('-').next().unwrap_or(&run_id);
        let dir_name = format!("{}_{prefix}", started_at.format(RUN_TIMESTAMP_FORMAT));
        Self {
            root: artifact_dir.join(dir_name),
            run_id,
            started_at,
        }
    }

    fn ingestion_dir(&self) -> PathBuf {
        self.root.join("data_ingestion")
    }

    fn validation_dir(&self) -> PathBuf {
        self.root.join("data_validation")
    }

    fn transformation_dir(&self) -> PathBuf {
        self.root.join("data_transformation")
    }

    pub fn feature_store_file(&self, file_name: &str) -> PathBuf {
        self.ingestion_dir().join("feature_store").join(file_name)
    }

    pub fn ingested_train_file(&self) -> PathBuf {
        self.ingestion_dir().join("ingested").join("train.csv")
    }

    pub fn ingested_test_file(&self) -> PathBuf {
        self.ingestion_dir().join("ingested").join("test.csv")
    }

    pub fn valid_train_file(&self) -> PathBuf {
        self.validation_dir().join("validated").join("train.csv")
    }

    pub fn valid_test_file(&self) -> PathBuf {
        self.validation_dir().join("validated").join("test.csv")
    }

    pub fn invalid_train_file(&self) -> PathBuf {
        self.validation_dir().join("invalid").join("train.csv")
    }

    pub fn invalid_test_file(&self) -> PathBuf {
        self.validation_dir().join("invalid").join("test.csv")
    }

    pub fn drift_report_file(&self) -> PathBuf {
        self.validation_dir().join("drift_report").join("report.yaml")
    }

    pub fn transformed_train_file(&self) -> PathBuf {
        self.transformation_dir().join("transformed").join("train.json")
    }

    pub fn transformed_test_file(&self) -> PathBuf {
        self.transformation_dir().join("transformed").join("test.json")
    }

    pub fn preprocessor_file(&self) -> PathBuf {
        self.transformation_dir()
            .join("transformed_object")
            .join("preprocessing.json")
    }

    pub fn trained_model_file(&self) -> PathBuf {
        self.root
            .join("model_trainer")
            .join("trained_model")
            .join("model.json")
    }
}

/// Compute SHA-256 hash of file contents.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let content = std::fs::read(path)?;
    Ok(hash_bytes(&content))
}

/// Compute SHA-256 hash of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
