//! Training pipeline orchestrator.
//!
//! Runs `Ingest → Validate → Transform → Train` strictly in sequence. Each
//! stage's artifact is the next stage's only input. The first failure moves
//! the run to the absorbing [`RunState::Failed`]; nothing is retried.

use crate::artifact::{
    DataIngestionArtifact, DataTransformationArtifact, DataValidationArtifact,
    ModelTrainerArtifact,
};
use crate::config::PipelineConfig;
use crate::data::ingest::DataIngestion;
use crate::data::source::RecordStore;
use crate::data::storage::RunWorkspace;
use crate::data::transform::DataTransformation;
use crate::data::validate::DataValidation;
use crate::error::{PipelineError, Stage, StageFailure};
use crate::training::trainer::ModelTrainer;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span};

/// Everything a stage may depend on, built once per run.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub store: Arc<dyn RecordStore>,
    pub workspace: RunWorkspace,
}

impl PipelineContext {
    /// Validate `config` and open a fresh timestamped workspace under
    /// `config.artifact_dir`.
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let workspace = RunWorkspace::new(&config.artifact_dir);
        Ok(Self {
            config: Arc::new(config),
            store,
            workspace,
        })
    }
}

/// Position of a run in the stage state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Ingest,
    Validate,
    Transform,
    Train,
    Done,
    Failed {
        stage: Stage,
        /// Machine tag of the error, see [`PipelineError::kind`].
        kind: String,
        cause: String,
    },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }

    pub fn failed(failure: &StageFailure) -> Self {
        Self::Failed {
            stage: failure.stage,
            kind: failure.error.kind().to_string(),
            cause: failure.error.to_string(),
        }
    }
}

/// Result of one stage: its artifact or the tagged failure.
pub type StageOutcome<T> = Result<T, StageFailure>;

/// Record of a finished pipeline run.
#[derive(Debug)]
pub struct PipelineRun {
    pub run_id: String,
    pub workspace: PathBuf,
    /// Every state entered, in order, including the final one.
    pub visited: Vec<RunState>,
    pub state: RunState,
    pub trainer: Option<ModelTrainerArtifact>,
    pub failure: Option<StageFailure>,
}

impl PipelineRun {
    fn start(workspace: &RunWorkspace) -> Self {
        Self {
            run_id: workspace.run_id.clone(),
            workspace: workspace.root.clone(),
            visited: vec![RunState::Ingest],
            state: RunState::Ingest,
            trainer: None,
            failure: None,
        }
    }

    fn advance(&mut self, next: RunState) {
        self.visited.push(next.clone());
        self.state = next;
    }

    fn fail(mut self, failure: StageFailure) -> Self {
        error!(
            stage = %failure.stage,
            kind = failure.error.kind(),
            error = %failure.error,
            "Pipeline run failed"
        );
        self.advance(RunState::failed(&failure));
        self.failure = Some(failure);
        self
    }

    pub fn succeeded(&self) -> bool {
        self.state == RunState::Done
    }

    /// Whether the run ever entered `state`'s stage.
    pub fn visited_stage(&self, state: &RunState) -> bool {
        self.visited.contains(state)
    }
}

/// Sequences the four stages over one [`PipelineContext`].
pub struct TrainingPipeline {
    ctx: PipelineContext,
}

impl TrainingPipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Drive the run to `Done` or `Failed`.
    pub async fn run(&self) -> PipelineRun {
        let span = info_span!("pipeline_run", run_id = %self.ctx.workspace.run_id);
        self.run_stages().instrument(span).await
    }

    async fn run_stages(&self) -> PipelineRun {
        let mut run = PipelineRun::start(&self.ctx.workspace);
        info!(workspace = %run.workspace.display(), "Pipeline run started");

        let ingestion = match self.ingest().await {
            Ok(artifact) => artifact,
            Err(failure) => return run.fail(failure),
        };

        run.advance(RunState::Validate);
        let validation = match self.validate(&ingestion).await {
            Ok(artifact) => artifact,
            Err(failure) => return run.fail(failure),
        };

        run.advance(RunState::Transform);
        let transformation = match self.transform(&validation).await {
            Ok(artifact) => artifact,
            Err(failure) => return run.fail(failure),
        };

        run.advance(RunState::Train);
        let trainer = match self.train(&transformation).await {
            Ok(artifact) => artifact,
            Err(failure) => return run.fail(failure),
        };

        info!(
            model = %trainer.model_name,
            f1 = trainer.test_metrics.f1_score,
            accuracy = trainer.test_metrics.accuracy,
            overfit_flagged = trainer.overfit_flagged,
            "Pipeline run completed"
        );
        run.trainer = Some(trainer);
        run.advance(RunState::Done);
        run
    }

    async fn ingest(&self) -> StageOutcome<DataIngestionArtifact> {
        info!(stage = %Stage::Ingest, "Stage started");
        DataIngestion::new(
            self.ctx.store.clone(),
            self.ctx.config.ingestion.clone(),
            self.ctx.workspace.clone(),
        )
        .initiate()
        .await
        .map_err(|e| StageFailure::new(Stage::Ingest, e))
    }

    async fn validate(
        &self,
        ingestion: &DataIngestionArtifact,
    ) -> StageOutcome<DataValidationArtifact> {
        info!(stage = %Stage::Validate, "Stage started");
        let artifact = DataValidation::new(
            self.ctx.config.validation.clone(),
            self.ctx.workspace.clone(),
        )
        .initiate(ingestion)
        .await
        .map_err(|e| StageFailure::new(Stage::Validate, e))?;

        match artifact.report.failure() {
            Some(error) => Err(StageFailure::new(Stage::Validate, error)),
            None => Ok(artifact),
        }
    }

    async fn transform(
        &self,
        validation: &DataValidationArtifact,
    ) -> StageOutcome<DataTransformationArtifact> {
        info!(stage = %Stage::Transform, "Stage started");
        DataTransformation::new(
            self.ctx.config.transformation.clone(),
            self.ctx.workspace.clone(),
        )
        .initiate(validation)
        .await
        .map_err(|e| StageFailure::new(Stage::Transform, e))
    }

    async fn train(
        &self,
        transformation: &DataTransformationArtifact,
    ) -> StageOutcome<ModelTrainerArtifact> {
        info!(stage = %Stage::Train, "Stage started");
        ModelTrainer::new(
            self.ctx.config.trainer.clone(),
            self.ctx.config.final_model_dir.clone(),
            self.ctx.workspace.clone(),
        )
        .initiate(transformation)
        .await
        .map_err(|e| StageFailure::new(Stage::Train, e))
    }
}
