//! Data transformation: target separation, imputation, dense matrices.

use crate::artifact::{DataTransformationArtifact, DataValidationArtifact};
use crate::config::TransformationConfig;
use crate::data::frame::Frame;
use crate::data::impute::{FittedImputer, ImputerStrategy};
use crate::data::storage::RunWorkspace;
use crate::error::PipelineError;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Map a raw label to the binary class: `1` is phishing, anything else is
/// legitimate.
pub fn normalize_label(raw: f64) -> u8 {
    if raw == 1.0 { 1 } else { 0 }
}

/// Fitted preprocessing: which columns feed the model, in which order, and
/// how their gaps are filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub feature_columns: Vec<String>,
    pub imputer: FittedImputer,
}

impl Preprocessor {
    /// Fit on a feature-only frame (target already removed).
    pub fn fit(strategy: &ImputerStrategy, features: &Frame) -> Result<Self, PipelineError> {
        let imputer = FittedImputer::fit(strategy, features.columns(), features.rows())?;
        Ok(Self {
            feature_columns: features.columns().to_vec(),
            imputer,
        })
    }

    /// Project `frame` onto the fitted feature columns and impute.
    ///
    /// Extra columns are ignored; a missing one fails with
    /// [`PipelineError::MissingColumn`].
    pub fn transform(&self, frame: &Frame) -> Result<Array2<f64>, PipelineError> {
        let projected = frame.select(&self.feature_columns)?;
        self.imputer.transform(projected.rows())
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        phishnet_core::persistence::atomic_write_json(path, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        phishnet_core::persistence::load_json(path)?.ok_or_else(|| {
            PipelineError::artifact(format!("preprocessor {} not found", path.display()))
        })
    }
}

/// Imputed features with aligned binary labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedMatrix {
    pub features: Array2<f64>,
    pub labels: Array1<u8>,
}

impl TransformedMatrix {
    pub fn new(features: Array2<f64>, labels: Array1<u8>) -> Result<Self, PipelineError> {
        if features.nrows() != labels.len() {
            return Err(PipelineError::transform(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    pub fn rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        phishnet_core::persistence::atomic_write_json(path, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let matrix: Self = phishnet_core::persistence::load_json(path)?.ok_or_else(|| {
            PipelineError::transform(format!("matrix {} not found", path.display()))
        })?;
        Self::new(matrix.features, matrix.labels)
    }
}

/// Splits the target from a frame and normalizes it.
fn split_target(frame: &Frame, target: &str) -> Result<(Frame, Array1<u8>), PipelineError> {
    let raw = frame.column(target).ok_or_else(|| {
        PipelineError::transform(format!("target column `{target}` is missing"))
    })?;
    let labels = raw
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.map(normalize_label)
                .ok_or_else(|| PipelineError::transform(format!("row {i} has no label")))
        })
        .collect::<Result<Vec<u8>, _>>()?;

    let mut features = frame.clone();
    features.drop_column(target);
    Ok((features, Array1::from(labels)))
}

/// Fit the preprocessor on the train features and impute both splits.
///
/// A feature the test split lacks is a fit failure, not a serving error.
fn build_matrices(
    strategy: &ImputerStrategy,
    (train_features, train_labels): (&Frame, Array1<u8>),
    (test_features, test_labels): (&Frame, Array1<u8>),
) -> Result<(Preprocessor, TransformedMatrix, TransformedMatrix), PipelineError> {
    let preprocessor = Preprocessor::fit(strategy, train_features)?;
    let train = TransformedMatrix::new(preprocessor.transform(train_features)?, train_labels)?;
    let test_features = preprocessor.transform(test_features).map_err(|e| match e {
        PipelineError::MissingColumn(c) => {
            PipelineError::transform(format!("test split lacks feature `{c}`"))
        }
        other => other,
    })?;
    let test = TransformedMatrix::new(test_features, test_labels)?;
    Ok((preprocessor, train, test))
}

/// Fits the preprocessor on the validated train split and applies it to both.
pub struct DataTransformation {
    config: TransformationConfig,
    workspace: RunWorkspace,
}

impl DataTransformation {
    pub fn new(config: TransformationConfig, workspace: RunWorkspace) -> Self {
        Self { config, workspace }
    }

    pub async fn initiate(
        &self,
        validation: &DataValidationArtifact,
    ) -> Result<DataTransformationArtifact, PipelineError> {
        let (Some(train_file), Some(test_file), true) = (
            validation.valid_train_file.as_ref(),
            validation.valid_test_file.as_ref(),
            validation.passed,
        ) else {
            return Err(PipelineError::transform(
                "validation did not pass, nothing to transform",
            ));
        };

        let train = Frame::read_csv(train_file)?;
        let test = Frame::read_csv(test_file)?;
        if train.is_empty() || test.is_empty() {
            return Err(PipelineError::transform(format!(
                "empty input after validation (train {} rows, test {} rows)",
                train.row_count(),
                test.row_count()
            )));
        }

        let target = validation.target_column.as_str();
        let (train_features, train_labels) = split_target(&train, target)?;
        let (test_features, test_labels) = split_target(&test, target)?;

        info!(
            strategy = ?self.config.imputer,
            features = train_features.column_count(),
            "Fitting preprocessor on train split"
        );
        let strategy = self.config.imputer.clone();
        let (preprocessor, train_matrix, test_matrix) = tokio::task::spawn_blocking(move || {
            build_matrices(
                &strategy,
                (&train_features, train_labels),
                (&test_features, test_labels),
            )
        })
        .await
        .map_err(|e| PipelineError::transform(format!("transform task failed: {e}")))??;
        debug!(
            train = ?train_matrix.features.dim(),
            test = ?test_matrix.features.dim(),
            "Matrices built"
        );

        let preprocessor_file = self.workspace.preprocessor_file();
        let transformed_train_file = self.workspace.transformed_train_file();
        let transformed_test_file = self.workspace.transformed_test_file();
        preprocessor.save(&preprocessor_file)?;
        train_matrix.save(&transformed_train_file)?;
        test_matrix.save(&transformed_test_file)?;

        info!(
            train_rows = train_matrix.rows(),
            test_rows = test_matrix.rows(),
            "Data transformation completed"
        );

        Ok(DataTransformationArtifact {
            preprocessor_file,
            transformed_train_file,
            transformed_test_file,
            feature_count: preprocessor.feature_columns.len(),
            train_rows: train_matrix.rows(),
            test_rows: test_matrix.rows(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::SchemaCheck;
    use crate::data::validate::ValidationReport;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn validated(
        dir: &TempDir,
        train: &Frame,
        test: &Frame,
    ) -> (RunWorkspace, DataValidationArtifact) {
        let workspace = RunWorkspace::new(&dir.path().join("Artifacts"));
        train.write_csv(&workspace.valid_train_file()).unwrap();
        test.write_csv(&workspace.valid_test_file()).unwrap();
        let artifact = DataValidationArtifact {
            passed: true,
            target_column: "Result".into(),
            valid_train_file: Some(workspace.valid_train_file()),
            valid_test_file: Some(workspace.valid_test_file()),
            invalid_train_file: None,
            invalid_test_file: None,
            drift_report_file: workspace.drift_report_file(),
            report: ValidationReport {
                train_schema: SchemaCheck::default(),
                test_schema: SchemaCheck::default(),
                drift_checked: true,
                significance: 0.05,
                columns: Vec::new(),
                drifted_columns: Vec::new(),
                max_drifted_columns: 0,
                passed: true,
            },
        };
        (workspace, artifact)
    }

    #[test]
    fn test_label_normalization() {
        assert_eq!(normalize_label(1.0), 1);
        assert_eq!(normalize_label(-1.0), 0);
        assert_eq!(normalize_label(0.0), 0);
        assert_eq!(normalize_label(2.0), 0);
    }

    #[test]
    fn test_preprocessor_rejects_missing_feature() {
        let train = Frame::from_rows(cols(&["a", "b"]), vec![vec![Some(1.0), Some(0.0)]]).unwrap();
        let pre = Preprocessor::fit(&ImputerStrategy::Mean, &train).unwrap();
        let rows = Frame::from_rows(cols(&["b"]), vec![vec![Some(1.0)]]).unwrap();
        assert!(matches!(
            pre.transform(&rows),
            Err(PipelineError::MissingColumn(c)) if c == "a"
        ));
    }

    #[tokio::test]
    async fn test_transform_fits_on_train_only() {
        let dir = TempDir::new().unwrap();
        let train = Frame::from_rows(
            cols(&["a", "Result"]),
            vec![
                vec![Some(1.0), Some(1.0)],
                vec![Some(3.0), Some(-1.0)],
            ],
        )
        .unwrap();
        let test = Frame::from_rows(
            cols(&["Result", "a"]),
            vec![vec![Some(-1.0), None], vec![Some(1.0), Some(100.0)]],
        )
        .unwrap();
        let (workspace, validation) = validated(&dir, &train, &test);
        let config = TransformationConfig {
            imputer: ImputerStrategy::Mean,
        };

        let artifact = DataTransformation::new(config, workspace)
            .initiate(&validation)
            .await
            .unwrap();
        assert_eq!(artifact.feature_count, 1);

        let test_matrix = TransformedMatrix::load(&artifact.transformed_test_file).unwrap();
        // The gap takes the train mean, not the test mean.
        assert_eq!(test_matrix.features[[0, 0]], 2.0);
        assert_eq!(test_matrix.labels.to_vec(), vec![0, 1]);

        let pre = Preprocessor::load(&artifact.preprocessor_file).unwrap();
        assert_eq!(pre.feature_columns, cols(&["a"]));
    }

    #[tokio::test]
    async fn test_all_null_feature_fails_transform() {
        let dir = TempDir::new().unwrap();
        let train = Frame::from_rows(
            cols(&["a", "Result"]),
            vec![vec![None, Some(1.0)], vec![None, Some(-1.0)]],
        )
        .unwrap();
        let (workspace, validation) = validated(&dir, &train, &train);
        let err = DataTransformation::new(TransformationConfig::default(), workspace)
            .initiate(&validation)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TransformFit(_)));
    }

    #[tokio::test]
    async fn test_failed_validation_is_rejected() {
        let dir = TempDir::new().unwrap();
        let frame =
            Frame::from_rows(cols(&["a", "Result"]), vec![vec![Some(1.0), Some(1.0)]]).unwrap();
        let (workspace, mut validation) = validated(&dir, &frame, &frame);
        validation.passed = false;
        let err = DataTransformation::new(TransformationConfig::default(), workspace)
            .initiate(&validation)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TransformFit(_)));
    }

    #[test]
    fn test_test_split_missing_feature_is_a_fit_failure() {
        let train = Frame::from_rows(
            cols(&["a", "b"]),
            vec![vec![Some(1.0), Some(0.0)], vec![Some(2.0), Some(1.0)]],
        )
        .unwrap();
        let test = Frame::from_rows(cols(&["a"]), vec![vec![Some(1.0)]]).unwrap();
        let err = build_matrices(
            &ImputerStrategy::Mean,
            (&train, Array1::from(vec![0u8, 1])),
            (&test, Array1::from(vec![1u8])),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::TransformFit(msg) if msg.contains("`b`")));
    }

    #[tokio::test]
    async fn test_knn_transform_fills_every_gap() {
        let dir = TempDir::new().unwrap();
        let rows = (0..200)
            .map(|i| {
                let a = if i % 7 == 0 { None } else { Some((i % 3) as f64 - 1.0) };
                vec![a, Some(if i % 2 == 0 { 1.0 } else { -1.0 })]
            })
            .collect();
        let frame = Frame::from_rows(cols(&["a", "Result"]), rows).unwrap();
        let (workspace, validation) = validated(&dir, &frame, &frame);

        let artifact = DataTransformation::new(TransformationConfig::default(), workspace)
            .initiate(&validation)
            .await
            .unwrap();
        let train = TransformedMatrix::load(&artifact.transformed_train_file).unwrap();
        assert_eq!(train.rows(), 200);
        assert!(train.features.iter().all(|v| v.is_finite()));
    }
}
