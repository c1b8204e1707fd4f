//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use anyhow::Context;
use phishnet_core::url_features::{extract_url_features, rule_signals};
use phishnet_ml::config::WORKSPACE_CONFIG_FILE;
use phishnet_ml::data::RawTable;
use phishnet_ml::{
    Frame, Label, ModelHandle, PipelineConfig, PipelineContext, PipelineError, RecordStore,
    RunState, SqliteStore, TrainingPipeline, load_config,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Column appended to the rows by `predict`.
const PREDICTION_COLUMN: &str = "predicted_column";

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, config_file),
        Commands::Train => handle_train(resolve_config(workspace, config_file)?).await,
        Commands::Predict { input, output } => handle_predict(
            &resolve_config(workspace, config_file)?,
            &anchor(workspace, input),
            &anchor(workspace, output),
        ),
        Commands::PredictUrl { url } => {
            handle_predict_url(&resolve_config(workspace, config_file)?, &url)
        }
        Commands::PushData { file } => {
            let config = resolve_config(workspace, config_file)?;
            handle_push_data(&config, &anchor(workspace, file)).await
        }
    }
}

/// Load the layered configuration and resolve its relative paths against
/// the workspace.
fn resolve_config(workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let mut config = load_config(Some(workspace), config_file)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    config.artifact_dir = anchor(workspace, config.artifact_dir);
    config.final_model_dir = anchor(workspace, config.final_model_dir);
    config.ingestion.database = anchor(workspace, config.ingestion.database);
    config.validation.schema_path = anchor(workspace, config.validation.schema_path);
    Ok(config)
}

fn anchor(workspace: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        workspace.join(path)
    }
}

/// Render a core error as a generic line carrying only its tag. The full
/// error goes to the structured log.
fn user_facing(action: &str, e: PipelineError) -> anyhow::Error {
    error!(error = %e, kind = e.kind(), "{action} failed");
    anyhow::anyhow!("{action} failed ({})", e.kind())
}

fn open_store(config: &PipelineConfig) -> SqliteStore {
    SqliteStore::new(&config.ingestion.database, &config.ingestion.id_column)
}

async fn handle_train(config: PipelineConfig) -> anyhow::Result<()> {
    let store: Arc<dyn RecordStore> = Arc::new(open_store(&config));
    let ctx = PipelineContext::new(config, store).map_err(|e| user_facing("Training", e))?;
    let run = TrainingPipeline::new(ctx).run().await;

    println!("Run:       {}", run.run_id);
    println!("Workspace: {}", run.workspace.display());
    match (&run.state, &run.trainer) {
        (RunState::Done, Some(trainer)) => {
            println!("State:     done");
            println!("Model:     {}", trainer.model_name);
            println!(
                "Train:     f1 {:.4}  precision {:.4}  recall {:.4}",
                trainer.train_metrics.f1_score,
                trainer.train_metrics.precision,
                trainer.train_metrics.recall
            );
            println!(
                "Test:      f1 {:.4}  precision {:.4}  recall {:.4}  accuracy {:.4}",
                trainer.test_metrics.f1_score,
                trainer.test_metrics.precision,
                trainer.test_metrics.recall,
                trainer.test_metrics.accuracy
            );
            if trainer.overfit_flagged {
                println!("Warning:   model shipped with the overfit flag set");
            }
            println!("Deployed:  {}", trainer.deployed_model_file.display());
            Ok(())
        }
        (RunState::Failed { stage, kind, .. }, _) => {
            println!("State:     failed");
            anyhow::bail!("Training failed at stage `{stage}` ({kind})")
        }
        (state, _) => anyhow::bail!("Training stopped in unexpected state {state:?}"),
    }
}

fn handle_predict(config: &PipelineConfig, input: &Path, output: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let mut table = RawTable::parse_csv(&content).map_err(|e| user_facing("Prediction", e))?;

    let handle =
        ModelHandle::load(&config.final_model_dir).map_err(|e| user_facing("Prediction", e))?;
    let rows = table
        .numeric(
            handle.current().feature_columns(),
            &config.ingestion.missing_sentinels,
        )
        .map_err(|e| user_facing("Prediction", e))?;
    let labels = handle
        .predict(&rows)
        .map_err(|e| user_facing("Prediction", e))?;

    let phishing = labels.iter().filter(|l| l.is_phishing()).count();
    table
        .push_column(
            PREDICTION_COLUMN,
            labels.iter().map(|l| l.as_u8().to_string()).collect(),
        )
        .map_err(|e| user_facing("Prediction", e))?;
    table
        .write_csv(output)
        .map_err(|e| user_facing("Prediction", e))?;

    info!(rows = labels.len(), phishing, output = %output.display(), "Predictions written");
    println!(
        "Classified {} row(s): {} phishing, {} legitimate",
        labels.len(),
        phishing,
        labels.len() - phishing
    );
    println!("Output: {}", output.display());
    Ok(())
}

/// Final verdict shown for a single URL.
fn verdict(label: Label, signals: &[&str]) -> &'static str {
    if label.is_phishing() {
        "Phishing Website Detected"
    } else if !signals.is_empty() {
        "Potentially Suspicious"
    } else {
        "Legitimate Website"
    }
}

fn handle_predict_url(config: &PipelineConfig, url: &str) -> anyhow::Result<()> {
    let features = extract_url_features(url);
    debug!(
        url,
        unknown = features.unknown_count(),
        "Extracted URL features"
    );
    let row = Frame::from_rows(
        features.column_names(),
        vec![features.values().into_iter().map(Some).collect()],
    )
    .map_err(|e| user_facing("Prediction", e))?;

    let handle =
        ModelHandle::load(&config.final_model_dir).map_err(|e| user_facing("Prediction", e))?;
    let label = handle
        .predict(&row)
        .map_err(|e| user_facing("Prediction", e))?
        .into_iter()
        .next()
        .unwrap_or(Label::Legitimate);

    let signals = rule_signals(url);
    println!("URL:     {url}");
    println!("Model:   {label}");
    if !signals.is_empty() {
        println!("Signals: {}", signals.join(", "));
    }
    println!("Verdict: {}", verdict(label, &signals));
    Ok(())
}

async fn handle_push_data(config: &PipelineConfig, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let frame = Frame::parse_csv(&content, &config.ingestion.missing_sentinels)
        .map_err(|e| user_facing("Push", e))?;

    let store = open_store(config);
    let written = store
        .replace(&config.ingestion.collection, &frame)
        .await
        .map_err(|e| user_facing("Push", e))?;

    println!(
        "Inserted {written} record(s) into `{}` ({})",
        config.ingestion.collection,
        config.ingestion.database.display()
    );
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let path = workspace.join(WORKSPACE_CONFIG_FILE);
            if path.exists() {
                println!("Configuration already exists at {}", path.display());
                return Ok(());
            }
            let toml_str = toml::to_string_pretty(&PipelineConfig::default())?;
            std::fs::write(&path, toml_str)?;
            println!("Created configuration at {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), config_file)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{toml_str}");
            Ok(())
        }
    }
}
