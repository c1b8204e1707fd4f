//! Configuration types for the training pipeline.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace `phishnet.toml` -> explicit file -> environment.

use crate::algorithms::Algorithm;
use crate::data::impute::ImputerStrategy;
use crate::error::PipelineError;
use crate::training::metrics::Metric;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace-local configuration file.
pub const WORKSPACE_CONFIG_FILE: &str = "phishnet.toml";

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root under which every run gets a timestamped workspace.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// Deployment location of the inference bundle read by serving.
    #[serde(default = "default_final_model_dir")]
    pub final_model_dir: PathBuf,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub transformation: TransformationConfig,
    #[serde(default)]
    pub trainer: TrainerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            final_model_dir: default_final_model_dir(),
            ingestion: IngestionConfig::default(),
            validation: ValidationConfig::default(),
            transformation: TransformationConfig::default(),
            trainer: TrainerConfig::default(),
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("Artifacts")
}

fn default_final_model_dir() -> PathBuf {
    PathBuf::from("final_model")
}

impl PipelineConfig {
    /// Reject settings no stage could run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let ratio = self.ingestion.test_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(PipelineError::Config(format!(
                "ingestion.test_ratio must be in (0, 1), got {ratio}"
            )));
        }
        let alpha = self.validation.significance;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(PipelineError::Config(format!(
                "validation.significance must be in (0, 1), got {alpha}"
            )));
        }
        if self.validation.max_workers == 0 {
            return Err(PipelineError::Config(
                "validation.max_workers must be at least 1".into(),
            ));
        }
        if self.trainer.candidates.is_empty() {
            return Err(PipelineError::Config(
                "trainer.candidates must name at least one algorithm".into(),
            ));
        }
        if let ImputerStrategy::Knn { n_neighbors: 0 } = self.transformation.imputer {
            return Err(PipelineError::Config(
                "transformation.imputer.n_neighbors must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Data ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Record store database (SQLite file).
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Collection (table) holding the labeled records.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Store-internal identifier column dropped on read.
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Cell values treated as missing.
    #[serde(default = "default_missing_sentinels")]
    pub missing_sentinels: Vec<String>,
    /// Fraction of rows held out for the test split.
    #[serde(default = "default_test_ratio")]
    pub test_ratio: f64,
    /// Seed of the train/test shuffle.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// File name of the raw export inside the feature store.
    #[serde(default = "default_feature_store_file")]
    pub feature_store_file: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            collection: default_collection(),
            id_column: default_id_column(),
            missing_sentinels: default_missing_sentinels(),
            test_ratio: default_test_ratio(),
            seed: default_seed(),
            feature_store_file: default_feature_store_file(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("data/network_security.db")
}

fn default_collection() -> String {
    "NetworkData".to_string()
}

fn default_id_column() -> String {
    "_id".to_string()
}

fn default_missing_sentinels() -> Vec<String> {
    vec!["na".to_string(), "NA".to_string(), String::new()]
}

fn default_test_ratio() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_feature_store_file() -> String {
    "phisingData.csv".to_string()
}

/// Data validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// YAML schema describing the expected columns.
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,
    /// KS-test p-value below which a column counts as drifted.
    #[serde(default = "default_significance")]
    pub significance: f64,
    /// Number of drifted columns tolerated before the verdict fails.
    #[serde(default)]
    pub max_drifted_columns: usize,
    /// Upper bound on concurrently running per-column tests.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            schema_path: default_schema_path(),
            significance: default_significance(),
            max_drifted_columns: 0,
            max_workers: default_max_workers(),
        }
    }
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("data_schema/schema.yaml")
}

fn default_significance() -> f64 {
    0.05
}

fn default_max_workers() -> usize {
    4
}

/// Data transformation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformationConfig {
    #[serde(default)]
    pub imputer: ImputerStrategy,
}

/// What to do when train and test scores diverge too much.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverfitAction {
    /// Fail the training stage.
    #[default]
    Fail,
    /// Ship the model but mark the artifact.
    Flag,
}

/// Model trainer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Algorithms fitted and compared on every run.
    #[serde(default = "default_candidates")]
    pub candidates: Vec<Algorithm>,
    /// Metric used for model selection and both gates.
    #[serde(default)]
    pub selection_metric: Metric,
    /// Minimum acceptable test score of the selected model.
    #[serde(default = "default_expected_score")]
    pub expected_score: f64,
    /// Maximum tolerated |train - test| score difference.
    #[serde(default = "default_overfit_threshold")]
    pub overfit_threshold: f64,
    #[serde(default)]
    pub overfit_action: OverfitAction,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            selection_metric: Metric::default(),
            expected_score: default_expected_score(),
            overfit_threshold: default_overfit_threshold(),
            overfit_action: OverfitAction::default(),
        }
    }
}

fn default_candidates() -> Vec<Algorithm> {
    vec![
        Algorithm::default_logistic_regression(),
        Algorithm::default_decision_tree(),
        Algorithm::default_random_forest(),
    ]
}

fn default_expected_score() -> f64 {
    0.6
}

fn default_overfit_threshold() -> f64 {
    0.05
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `PHISHNET_`, `__` separates sections)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local `phishnet.toml`
/// 4. User config (`~/.config/phishnet/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<PipelineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "phishnet", "phishnet") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_CONFIG_FILE);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    // PHISHNET_INGESTION__COLLECTION, PHISHNET_TRAINER__EXPECTED_SCORE, ...
    figment = figment.merge(Env::prefixed("PHISHNET_").split("__"));

    figment.extract().map_err(Box::new)
}
