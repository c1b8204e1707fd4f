//! Data validation: schema conformance and train/test drift.

use crate::artifact::{DataIngestionArtifact, DataValidationArtifact};
use crate::config::ValidationConfig;
use crate::data::drift::ks_2samp;
use crate::data::frame::Frame;
use crate::data::schema::{SchemaCheck, SchemaSpec};
use crate::data::storage::RunWorkspace;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Drift test outcome for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub column: String,
    pub statistic: f64,
    pub p_value: f64,
    pub drift_detected: bool,
}

/// Validation verdict of one pipeline run. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub train_schema: SchemaCheck,
    pub test_schema: SchemaCheck,
    /// False when the schema check short-circuited the run.
    pub drift_checked: bool,
    pub significance: f64,
    pub columns: Vec<ColumnDrift>,
    pub drifted_columns: Vec<String>,
    pub max_drifted_columns: usize,
    pub passed: bool,
}

impl ValidationReport {
    pub fn schema_passed(&self) -> bool {
        self.train_schema.passed() && self.test_schema.passed()
    }

    /// Convert a failing verdict into the error the pipeline reports.
    pub fn failure(&self) -> Option<PipelineError> {
        if self.passed {
            return None;
        }
        if !self.schema_passed() {
            let mut missing = self.train_schema.missing.clone();
            missing.extend(self.test_schema.missing.iter().cloned());
            missing.sort();
            missing.dedup();
            let mut unexpected = self.train_schema.unexpected.clone();
            unexpected.extend(self.test_schema.unexpected.iter().cloned());
            unexpected.sort();
            unexpected.dedup();
            return Some(PipelineError::schema(format!(
                "missing columns {missing:?}, unexpected columns {unexpected:?}"
            )));
        }
        Some(PipelineError::Drift {
            count: self.drifted_columns.len(),
            columns: self.drifted_columns.clone(),
        })
    }
}

/// Checks the ingested splits against the schema and against each other.
pub struct DataValidation {
    config: ValidationConfig,
    workspace: RunWorkspace,
}

impl DataValidation {
    pub fn new(config: ValidationConfig, workspace: RunWorkspace) -> Self {
        Self { config, workspace }
    }

    /// Run the checks. A failing verdict is still `Ok`; callers inspect
    /// [`DataValidationArtifact::passed`].
    pub async fn initiate(
        &self,
        ingestion: &DataIngestionArtifact,
    ) -> Result<DataValidationArtifact, PipelineError> {
        let schema = SchemaSpec::load(&self.config.schema_path)?;
        let train = Frame::read_csv(&ingestion.train_file)?;
        let test = Frame::read_csv(&ingestion.test_file)?;

        let train_schema = schema.check_columns(train.columns());
        let test_schema = schema.check_columns(test.columns());
        let schema_ok = train_schema.passed() && test_schema.passed();

        let columns = if schema_ok {
            self.detect_drift(&schema, Arc::new(train), Arc::new(test))
                .await?
        } else {
            warn!(
                train_missing = ?train_schema.missing,
                test_missing = ?test_schema.missing,
                "Schema check failed, skipping drift tests"
            );
            Vec::new()
        };

        let drifted_columns: Vec<String> = columns
            .iter()
            .filter(|c| c.drift_detected)
            .map(|c| c.column.clone())
            .collect();
        let passed = schema_ok && drifted_columns.len() <= self.config.max_drifted_columns;

        let report = ValidationReport {
            train_schema,
            test_schema,
            drift_checked: schema_ok,
            significance: self.config.significance,
            columns,
            drifted_columns,
            max_drifted_columns: self.config.max_drifted_columns,
            passed,
        };

        let drift_report_file = self.workspace.drift_report_file();
        let yaml = serde_yaml::to_string(&report)?;
        phishnet_core::persistence::atomic_write(&drift_report_file, yaml.as_bytes())?;

        let (train_dest, test_dest) = if passed {
            (
                self.workspace.valid_train_file(),
                self.workspace.valid_test_file(),
            )
        } else {
            (
                self.workspace.invalid_train_file(),
                self.workspace.invalid_test_file(),
            )
        };
        phishnet_core::persistence::atomic_copy(&ingestion.train_file, &train_dest)?;
        phishnet_core::persistence::atomic_copy(&ingestion.test_file, &test_dest)?;

        if passed {
            info!(
                drifted = report.drifted_columns.len(),
                tested = report.columns.len(),
                "Data validation passed"
            );
        } else {
            warn!(
                schema_ok,
                drifted = ?report.drifted_columns,
                "Data validation failed"
            );
        }

        Ok(DataValidationArtifact {
            passed,
            target_column: schema.target_column().to_string(),
            valid_train_file: passed.then(|| train_dest.clone()),
            valid_test_file: passed.then(|| test_dest.clone()),
            invalid_train_file: (!passed).then_some(train_dest),
            invalid_test_file: (!passed).then_some(test_dest),
            drift_report_file,
            report,
        })
    }

    /// KS-test every numeric schema column, at most `max_workers` at a time.
    /// Results come back in schema order.
    async fn detect_drift(
        &self,
        schema: &SchemaSpec,
        train: Arc<Frame>,
        test: Arc<Frame>,
    ) -> Result<Vec<ColumnDrift>, PipelineError> {
        let targets: Vec<String> = if schema.numerical_columns().is_empty() {
            schema.column_names()
        } else {
            schema.numerical_columns().to_vec()
        };
        let alpha = self.config.significance;
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut handles = Vec::with_capacity(targets.len());

        for column in targets {
            let sem = semaphore.clone();
            let train = train.clone();
            let test = test.clone();

            handles.push(tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::validation(format!("worker pool closed: {e}")))?;
                tokio::task::spawn_blocking(move || test_column(&column, &train, &test, alpha))
                    .await
                    .map_err(|e| PipelineError::validation(format!("drift task failed: {e}")))
            }));
        }

        futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.map_err(|e| PipelineError::validation(format!("drift task failed: {e}")))?
            })
            .collect()
    }
}

fn test_column(column: &str, train: &Frame, test: &Frame, alpha: f64) -> ColumnDrift {
    let a = train.observed(column).unwrap_or_default();
    let b = test.observed(column).unwrap_or_default();
    match ks_2samp(&a, &b) {
        Some(ks) => {
            let drift_detected = ks.rejects(alpha);
            debug!(
                column,
                statistic = ks.statistic,
                p_value = ks.p_value,
                drift_detected,
                "KS test"
            );
            ColumnDrift {
                column: column.to_string(),
                statistic: ks.statistic,
                p_value: ks.p_value,
                drift_detected,
            }
        }
        None => {
            warn!(column, "No observed values on one side, drift test skipped");
            ColumnDrift {
                column: column.to_string(),
                statistic: 0.0,
                p_value: 1.0,
                drift_detected: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::SourceInfo;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SCHEMA: &str = "\
columns:
  - a: int64
  - Result: int64
numerical_columns:
  - a
  - Result
";

    struct Fixture {
        _dir: TempDir,
        config: ValidationConfig,
        workspace: RunWorkspace,
        ingestion: DataIngestionArtifact,
    }

    fn fixture(train: Frame, test: Frame) -> Fixture {
        let dir = TempDir::new().unwrap();
        let schema_path = dir.path().join("schema.yaml");
        std::fs::write(&schema_path, SCHEMA).unwrap();
        let workspace = RunWorkspace::new(&dir.path().join("Artifacts"));
        let train_file = workspace.ingested_train_file();
        let test_file = workspace.ingested_test_file();
        train.write_csv(&train_file).unwrap();
        test.write_csv(&test_file).unwrap();

        let ingestion = DataIngestionArtifact {
            feature_store_file: dir.path().join("unused.csv"),
            train_file,
            test_file,
            train_rows: train.row_count(),
            test_rows: test.row_count(),
            source: SourceInfo {
                store_type: "memory".into(),
                database: "memory".into(),
                collection: "NetworkData".into(),
                accessed_at: chrono::Utc::now(),
            },
        };
        Fixture {
            config: ValidationConfig {
                schema_path,
                ..ValidationConfig::default()
            },
            workspace,
            ingestion,
            _dir: dir,
        }
    }

    fn frame(columns: &[&str], a: impl Fn(usize) -> f64, n: usize) -> Frame {
        let rows = (0..n)
            .map(|i| {
                let mut row = vec![Some(a(i))];
                if columns.len() > 1 {
                    row.push(Some(if i % 2 == 0 { 1.0 } else { -1.0 }));
                }
                row
            })
            .collect();
        Frame::from_rows(columns.iter().map(|s| s.to_string()).collect(), rows).unwrap()
    }

    #[tokio::test]
    async fn test_matching_splits_pass() {
        let split = frame(&["a", "Result"], |i| (i % 3) as f64 - 1.0, 30);
        let fx = fixture(split.clone(), split);
        let artifact = DataValidation::new(fx.config.clone(), fx.workspace.clone())
            .initiate(&fx.ingestion)
            .await
            .unwrap();

        assert!(artifact.passed);
        assert!(artifact.report.drift_checked);
        assert_eq!(artifact.report.columns.len(), 2);
        assert_eq!(artifact.report.columns[0].column, "a");
        assert!(artifact.valid_train_file.as_ref().unwrap().exists());
        assert!(artifact.invalid_train_file.is_none());

        let yaml = std::fs::read_to_string(&artifact.drift_report_file).unwrap();
        let parsed: ValidationReport = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, artifact.report);
    }

    #[tokio::test]
    async fn test_disjoint_column_is_flagged() {
        let train = frame(&["a", "Result"], |i| i as f64 / 20.0, 20);
        let test = frame(&["a", "Result"], |i| 100.0 + i as f64 / 20.0, 20);
        let fx = fixture(train, test);
        let artifact = DataValidation::new(fx.config.clone(), fx.workspace.clone())
            .initiate(&fx.ingestion)
            .await
            .unwrap();

        assert!(!artifact.passed);
        assert_eq!(artifact.report.drifted_columns, vec!["a".to_string()]);
        assert!(matches!(
            artifact.report.failure(),
            Some(PipelineError::Drift { count: 1, .. })
        ));
        assert!(artifact.invalid_test_file.as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn test_drift_tolerance_allows_configured_count() {
        let train = frame(&["a", "Result"], |i| i as f64 / 20.0, 20);
        let test = frame(&["a", "Result"], |i| 100.0 + i as f64 / 20.0, 20);
        let mut fx = fixture(train, test);
        fx.config.max_drifted_columns = 1;
        let artifact = DataValidation::new(fx.config.clone(), fx.workspace.clone())
            .initiate(&fx.ingestion)
            .await
            .unwrap();
        assert!(artifact.passed);
        assert_eq!(artifact.report.drifted_columns.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_column_short_circuits_drift() {
        let train = frame(&["a"], |i| i as f64, 10);
        let test = frame(&["a", "Result"], |i| i as f64, 10);
        let fx = fixture(train, test);
        let artifact = DataValidation::new(fx.config.clone(), fx.workspace.clone())
            .initiate(&fx.ingestion)
            .await
            .unwrap();

        assert!(!artifact.passed);
        assert!(!artifact.report.drift_checked);
        assert!(artifact.report.columns.is_empty());
        assert_eq!(artifact.report.train_schema.missing, vec!["Result".to_string()]);
        assert!(matches!(
            artifact.report.failure(),
            Some(PipelineError::SchemaMismatch(_))
        ));
        assert!(artifact.drift_report_file.exists());
    }
}
