//! Model trainer: candidate selection, quality gates, bundle deployment.

use crate::algorithms::{Algorithm, Classifier, TrainedModel};
use crate::artifact::{DataTransformationArtifact, ModelTrainerArtifact};
use crate::config::{OverfitAction, TrainerConfig};
use crate::data::storage::RunWorkspace;
use crate::data::transform::{Preprocessor, TransformedMatrix};
use crate::error::PipelineError;
use crate::inference::{InferenceArtifact, ModelMetadata};
use crate::training::metrics::{ClassificationMetrics, Metric};
use chrono::Utc;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// The winning candidate with its scores on both splits.
#[derive(Debug, Clone)]
pub struct SelectedModel {
    pub model: TrainedModel,
    pub train_metrics: ClassificationMetrics,
    pub test_metrics: ClassificationMetrics,
}

/// Fit every candidate and keep the best test score under `metric`.
///
/// Ties keep the earlier candidate.
pub fn select_best(
    candidates: &[Algorithm],
    train: &TransformedMatrix,
    test: &TransformedMatrix,
    metric: Metric,
) -> Result<SelectedModel, PipelineError> {
    let mut best: Option<(f64, SelectedModel)> = None;
    for algorithm in candidates {
        let model = algorithm.fit(train.features.view(), train.labels.view())?;
        let train_metrics = evaluate(&model, train)?;
        let test_metrics = evaluate(&model, test)?;
        let score = metric.score(&test_metrics);
        debug!(
            candidate = algorithm.name(),
            metric = %metric,
            train = metric.score(&train_metrics),
            test = score,
            "Candidate evaluated"
        );
        if best.as_ref().is_none_or(|(top, _)| score > *top) {
            best = Some((
                score,
                SelectedModel {
                    model,
                    train_metrics,
                    test_metrics,
                },
            ));
        }
    }
    best.map(|(_, selected)| selected)
        .ok_or_else(|| PipelineError::training("no candidate algorithms configured"))
}

fn evaluate(
    model: &TrainedModel,
    data: &TransformedMatrix,
) -> Result<ClassificationMetrics, PipelineError> {
    let predicted = model.predict(data.features.view())?;
    Ok(ClassificationMetrics::compute(&data.labels.to_vec(), &predicted))
}

/// Apply the quality gate and the overfit check. Returns whether the model
/// was flagged as overfit under [`OverfitAction::Flag`].
pub fn check_gates(
    config: &TrainerConfig,
    train_score: f64,
    test_score: f64,
) -> Result<bool, PipelineError> {
    let metric = config.selection_metric.as_str().to_string();
    if test_score < config.expected_score {
        return Err(PipelineError::QualityGate {
            metric,
            score: test_score,
            minimum: config.expected_score,
        });
    }
    if (train_score - test_score).abs() > config.overfit_threshold {
        return match config.overfit_action {
            OverfitAction::Fail => Err(PipelineError::Overfit {
                metric,
                train: train_score,
                test: test_score,
                threshold: config.overfit_threshold,
            }),
            OverfitAction::Flag => {
                warn!(
                    metric = %metric,
                    train = train_score,
                    test = test_score,
                    threshold = config.overfit_threshold,
                    "Selected model overfits, shipping it flagged"
                );
                Ok(true)
            }
        };
    }
    Ok(false)
}

/// Trains, gates and deploys the inference bundle.
pub struct ModelTrainer {
    config: TrainerConfig,
    final_model_dir: PathBuf,
    workspace: RunWorkspace,
}

impl ModelTrainer {
    pub fn new(config: TrainerConfig, final_model_dir: PathBuf, workspace: RunWorkspace) -> Self {
        Self {
            config,
            final_model_dir,
            workspace,
        }
    }

    pub async fn initiate(
        &self,
        transformation: &DataTransformationArtifact,
    ) -> Result<ModelTrainerArtifact, PipelineError> {
        let preprocessor = Preprocessor::load(&transformation.preprocessor_file)?;
        let train = TransformedMatrix::load(&transformation.transformed_train_file)?;
        let test = TransformedMatrix::load(&transformation.transformed_test_file)?;

        info!(
            candidates = self.config.candidates.len(),
            metric = %self.config.selection_metric,
            train_rows = train.rows(),
            "Training candidate models"
        );
        let candidates = self.config.candidates.clone();
        let metric = self.config.selection_metric;
        let selected = tokio::task::spawn_blocking(move || {
            select_best(&candidates, &train, &test, metric)
        })
        .await
        .map_err(|e| PipelineError::training(format!("training task failed: {e}")))??;

        let train_score = metric.score(&selected.train_metrics);
        let test_score = metric.score(&selected.test_metrics);
        info!(
            model = selected.model.name(),
            train = train_score,
            test = test_score,
            "Selected best model"
        );
        let overfit_flagged = check_gates(&self.config, train_score, test_score)?;
        let model_name = selected.model.name().to_string();

        let bundle = InferenceArtifact {
            preprocessor,
            model: selected.model,
            metadata: ModelMetadata {
                model_name: model_name.clone(),
                run_id: self.workspace.run_id.clone(),
                created_at: Utc::now(),
                selection_metric: metric,
                train_metrics: selected.train_metrics.clone(),
                test_metrics: selected.test_metrics.clone(),
                overfit_flagged,
            },
        };

        let model_file = self.workspace.trained_model_file();
        bundle.save(&model_file)?;
        let manifest = bundle.deploy(&self.final_model_dir)?;

        info!(
            model = %manifest.model_kind,
            sha256 = %manifest.sha256,
            "Model training completed"
        );

        Ok(ModelTrainerArtifact {
            model_file,
            deployed_model_file: self.final_model_dir.join(crate::inference::MODEL_FILE),
            model_name,
            train_metrics: selected.train_metrics,
            test_metrics: selected.test_metrics,
            overfit_flagged,
        })
    }
}
