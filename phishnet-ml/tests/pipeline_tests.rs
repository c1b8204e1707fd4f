//! End-to-end training pipeline tests.
//!
//! Every test runs the real stages against a temporary workspace with a small
//! synthetic URL-feature dataset.

use phishnet_ml::algorithms::Classifier;
use phishnet_ml::artifact::ModelTrainerArtifact;
use phishnet_ml::config::PipelineConfig;
use phishnet_ml::data::source::{DataBatch, MemoryStore, RecordStore, SqliteStore};
use phishnet_ml::data::transform::TransformedMatrix;
use phishnet_ml::data::validate::ValidationReport;
use phishnet_ml::data::{Frame, RunWorkspace};
use phishnet_ml::error::{PipelineError, Stage};
use phishnet_ml::inference::{InferenceArtifact, Label, ModelHandle};
use phishnet_ml::pipeline::{PipelineContext, RunState, TrainingPipeline};
use phishnet_ml::training::{ClassificationMetrics, select_best};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const SCHEMA: &str = r#"
columns:
  - having_IP_Address: int64
  - SSLfinal_State: int64
  - URL_Length: int64
  - Result: int64
numerical_columns:
  - having_IP_Address
  - SSLfinal_State
  - URL_Length
  - Result
"#;

/// 100 records. `SSLfinal_State` separates the classes perfectly; the other
/// features are noise in {-1, 0, 1}, with a few store "na" markers.
fn records(with_url_length: bool) -> DataBatch {
    let mut columns = vec!["_id", "having_IP_Address", "SSLfinal_State"];
    if with_url_length {
        columns.push("URL_Length");
    }
    columns.push("Result");

    let rows = (0..100)
        .map(|i: i64| {
            let phishing = (i * 37 + 11) % 100 < 50;
            let mut row = vec![json!(format!("64f0c2a1{i:04}"))];
            row.push(if i % 17 == 3 {
                json!("na")
            } else {
                json!((i * 7) % 3 - 1)
            });
            row.push(json!(if phishing { -1 } else { 1 }));
            if with_url_length {
                row.push(json!((i * 5 + 1) % 3 - 1));
            }
            row.push(json!(if phishing { 1 } else { -1 }));
            row
        })
        .collect();

    DataBatch {
        columns: columns.into_iter().map(String::from).collect(),
        rows,
    }
}

fn config(dir: &Path) -> PipelineConfig {
    let schema_path = dir.join("schema.yaml");
    std::fs::write(&schema_path, SCHEMA).unwrap();

    let mut config = PipelineConfig {
        artifact_dir: dir.join("Artifacts"),
        final_model_dir: dir.join("final_model"),
        ..PipelineConfig::default()
    };
    config.validation.schema_path = schema_path;
    config
}

async fn run_to_done(
    dir: &TempDir,
    store: Arc<dyn RecordStore>,
) -> (PipelineContext, ModelTrainerArtifact) {
    let ctx = PipelineContext::new(config(dir.path()), store).unwrap();
    let run = TrainingPipeline::new(ctx.clone()).run().await;
    assert_eq!(run.state, RunState::Done, "failure: {:?}", run.failure);
    assert_eq!(
        run.visited,
        vec![
            RunState::Ingest,
            RunState::Validate,
            RunState::Transform,
            RunState::Train,
            RunState::Done
        ]
    );
    (ctx, run.trainer.unwrap())
}

#[tokio::test]
async fn test_separable_dataset_reaches_done() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::with_batch("NetworkData", records(true)));
    let (ctx, trainer) = run_to_done(&dir, store).await;

    assert!(trainer.test_metrics.accuracy > 0.9);
    assert_eq!(trainer.test_metrics.support, 20);
    assert!(!trainer.overfit_flagged);
    assert!(trainer.model_file.exists());
    assert!(dir.path().join("final_model").join("manifest.json").exists());

    let ws = &ctx.workspace;
    assert!(ws.feature_store_file("phisingData.csv").exists());
    assert!(ws.valid_train_file().exists());
    assert!(ws.preprocessor_file().exists());
    let report: ValidationReport =
        serde_yaml::from_str(&std::fs::read_to_string(ws.drift_report_file()).unwrap()).unwrap();
    assert!(report.passed);
    assert_eq!(report.columns.len(), 4);
}

#[tokio::test]
async fn test_missing_schema_column_fails_at_validate() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::with_batch("NetworkData", records(false)));
    let ctx = PipelineContext::new(config(dir.path()), store).unwrap();
    let run = TrainingPipeline::new(ctx.clone()).run().await;

    assert!(matches!(
        &run.state,
        RunState::Failed { stage: Stage::Validate, kind, .. } if kind == "schema_mismatch"
    ));
    assert!(!run.visited_stage(&RunState::Transform));
    assert!(run.trainer.is_none());
    assert!(matches!(
        run.failure.as_ref().map(|f| &f.error),
        Some(PipelineError::SchemaMismatch(msg)) if msg.contains("URL_Length")
    ));

    let report: ValidationReport = serde_yaml::from_str(
        &std::fs::read_to_string(ctx.workspace.drift_report_file()).unwrap(),
    )
    .unwrap();
    assert!(!report.drift_checked);
    assert!(report.columns.is_empty());
    assert!(ctx.workspace.invalid_train_file().exists());
    assert!(!ctx.workspace.preprocessor_file().exists());
    assert!(!dir.path().join("final_model").exists());
}

#[tokio::test]
async fn test_reloaded_bundle_reproduces_training_predictions() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("network.db"), "_id"));

    // Load the records the way `push-data` does, through a frame.
    let frame = phishnet_ml::data::ingest::clean_batch(
        records(true),
        "_id",
        &["na".to_string()],
    )
    .unwrap();
    store.replace("NetworkData", &frame).await.unwrap();

    let (ctx, trainer) = run_to_done(&dir, store).await;
    let ws: &RunWorkspace = &ctx.workspace;

    let loaded = InferenceArtifact::load(&dir.path().join("final_model")).unwrap();
    let train = TransformedMatrix::load(&ws.transformed_train_file()).unwrap();
    let test = TransformedMatrix::load(&ws.transformed_test_file()).unwrap();

    // Refit on the persisted matrices: same candidates, same seeds.
    let trainer_config = &ctx.config.trainer;
    let fitted = select_best(
        &trainer_config.candidates,
        &train,
        &test,
        trainer_config.selection_metric,
    )
    .unwrap();
    assert_eq!(fitted.model.name(), trainer.model_name);

    let in_memory = fitted.model.predict(train.features.view()).unwrap();
    let reloaded = loaded.predict_matrix(train.features.view()).unwrap();
    assert_eq!(reloaded, in_memory);
    assert_eq!(
        ClassificationMetrics::compute(&train.labels.to_vec(), &reloaded),
        trainer.train_metrics
    );

    let predicted = loaded.predict_matrix(test.features.view()).unwrap();
    assert_eq!(
        ClassificationMetrics::compute(&test.labels.to_vec(), &predicted),
        trainer.test_metrics
    );

    // Raw rows go through the persisted preprocessor to the same answers.
    let raw_test = Frame::read_csv(&ws.valid_test_file()).unwrap();
    let labels = loaded.predict(&raw_test).unwrap();
    let as_classes: Vec<u8> = labels.iter().map(|l| l.as_u8()).collect();
    assert_eq!(as_classes, predicted);

    let workspace_copy = InferenceArtifact::load_file(&trainer.model_file).unwrap();
    assert_eq!(workspace_copy, loaded);
}

#[tokio::test]
async fn test_served_handle_predicts_and_rejects_missing_columns() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::with_batch("NetworkData", records(true)));
    run_to_done(&dir, store).await;

    let handle = ModelHandle::load(&dir.path().join("final_model")).unwrap();
    let rows = Frame::from_rows(
        vec![
            "URL_Length".into(),
            "SSLfinal_State".into(),
            "having_IP_Address".into(),
        ],
        vec![
            vec![Some(0.0), Some(-1.0), Some(1.0)],
            vec![Some(1.0), Some(1.0), None],
        ],
    )
    .unwrap();
    assert_eq!(
        handle.predict(&rows).unwrap(),
        vec![Label::Phishing, Label::Legitimate]
    );

    let partial = Frame::from_rows(
        vec!["SSLfinal_State".into()],
        vec![vec![Some(1.0)]],
    )
    .unwrap();
    assert!(matches!(
        handle.predict(&partial),
        Err(PipelineError::MissingColumn(_))
    ));
}

#[tokio::test]
async fn test_same_seed_same_split_across_runs() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let (ctx_a, _) = run_to_done(
        &dir_a,
        Arc::new(MemoryStore::with_batch("NetworkData", records(true))),
    )
    .await;
    let (ctx_b, _) = run_to_done(
        &dir_b,
        Arc::new(MemoryStore::with_batch("NetworkData", records(true))),
    )
    .await;

    assert_eq!(
        Frame::read_csv(&ctx_a.workspace.ingested_test_file()).unwrap(),
        Frame::read_csv(&ctx_b.workspace.ingested_test_file()).unwrap()
    );
}
