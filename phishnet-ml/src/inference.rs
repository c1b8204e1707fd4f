//! Inference wrapper: the persisted preprocessor + model bundle.
//!
//! A loaded [`InferenceArtifact`] is immutable. Serving holds it through a
//! [`ModelHandle`], which swaps in a freshly loaded bundle atomically so
//! in-flight predictions always finish against a consistent artifact.

use crate::algorithms::{Classifier, TrainedModel};
use crate::data::frame::Frame;
use crate::data::storage::hash_bytes;
use crate::data::transform::Preprocessor;
use crate::error::PipelineError;
use crate::training::metrics::{ClassificationMetrics, Metric};
use chrono::{DateTime, Utc};
use ndarray::ArrayView2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Bundle file name inside a model directory.
pub const MODEL_FILE: &str = "model.json";
/// Pause before the single reload retry; covers a deploy caught between
/// writing the bundle and its manifest.
const RELOAD_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Manifest file name inside a model directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Predicted class of a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Legitimate = 0,
    Phishing = 1,
}

impl Label {
    pub fn from_class(class: u8) -> Self {
        if class == 1 {
            Self::Phishing
        } else {
            Self::Legitimate
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_phishing(self) -> bool {
        self == Self::Phishing
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legitimate => f.write_str("legitimate"),
            Self::Phishing => f.write_str("phishing"),
        }
    }
}

/// Provenance of a trained bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_name: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub selection_metric: Metric,
    pub train_metrics: ClassificationMetrics,
    pub test_metrics: ClassificationMetrics,
    #[serde(default)]
    pub overfit_flagged: bool,
}

/// Preprocessor and model, always persisted and loaded together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceArtifact {
    pub preprocessor: Preprocessor,
    pub model: TrainedModel,
    pub metadata: ModelMetadata,
}

/// Integrity record written beside a deployed bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub file: String,
    pub sha256: String,
    pub model_kind: String,
    pub feature_columns: Vec<String>,
    pub test_metrics: ClassificationMetrics,
    pub created_at: DateTime<Utc>,
}

impl InferenceArtifact {
    /// Predict on already-imputed features, in preprocessor column order.
    pub fn predict_matrix(&self, x: ArrayView2<'_, f64>) -> Result<Vec<u8>, PipelineError> {
        self.model.predict(x)
    }

    /// Select the feature columns of `rows` by name, impute and predict.
    pub fn predict(&self, rows: &Frame) -> Result<Vec<Label>, PipelineError> {
        let x = self.preprocessor.transform(rows)?;
        Ok(self
            .predict_matrix(x.view())?
            .into_iter()
            .map(Label::from_class)
            .collect())
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.preprocessor.feature_columns
    }

    /// Atomically write the bundle to `path`. Returns its SHA-256.
    pub fn save(&self, path: &Path) -> Result<String, PipelineError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        phishnet_core::persistence::atomic_write(path, &bytes)?;
        Ok(hash_bytes(&bytes))
    }

    /// Write `model.json` and then `manifest.json` into `dir`.
    pub fn deploy(&self, dir: &Path) -> Result<ArtifactManifest, PipelineError> {
        let sha256 = self.save(&dir.join(MODEL_FILE))?;
        let manifest = ArtifactManifest {
            file: MODEL_FILE.to_string(),
            sha256,
            model_kind: self.model.name().to_string(),
            feature_columns: self.preprocessor.feature_columns.clone(),
            test_metrics: self.metadata.test_metrics.clone(),
            created_at: Utc::now(),
        };
        phishnet_core::persistence::atomic_write_json(&dir.join(MANIFEST_FILE), &manifest)?;
        info!(dir = %dir.display(), model = %manifest.model_kind, "Model deployed");
        Ok(manifest)
    }

    /// Load a bundle from a model directory, verifying the manifest hash when
    /// one is present.
    pub fn load(dir: &Path) -> Result<Self, PipelineError> {
        let model_path = dir.join(MODEL_FILE);
        let bytes = std::fs::read(&model_path).map_err(|e| {
            PipelineError::artifact(format!("cannot read {}: {e}", model_path.display()))
        })?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest: Option<ArtifactManifest> =
            phishnet_core::persistence::load_json(&manifest_path).map_err(|e| {
                PipelineError::artifact(format!("bad manifest {}: {e}", manifest_path.display()))
            })?;
        if let Some(manifest) = manifest {
            let actual = hash_bytes(&bytes);
            if actual != manifest.sha256 {
                return Err(PipelineError::artifact(format!(
                    "{} does not match its manifest (expected {}, found {actual})",
                    model_path.display(),
                    manifest.sha256
                )));
            }
        }

        Self::from_bytes(&bytes, &model_path)
    }

    /// Load a bundle file directly, without a manifest.
    pub fn load_file(path: &Path) -> Result<Self, PipelineError> {
        let bytes = std::fs::read(path)
            .map_err(|e| PipelineError::artifact(format!("cannot read {}: {e}", path.display())))?;
        Self::from_bytes(&bytes, path)
    }

    fn from_bytes(bytes: &[u8], origin: &Path) -> Result<Self, PipelineError> {
        let artifact: Self = serde_json::from_slice(bytes).map_err(|e| {
            PipelineError::artifact(format!("cannot decode {}: {e}", origin.display()))
        })?;
        if artifact.preprocessor.imputer.width() != artifact.preprocessor.feature_columns.len() {
            return Err(PipelineError::artifact(format!(
                "{}: imputer width does not match the feature list",
                origin.display()
            )));
        }
        Ok(artifact)
    }
}

/// Shared, hot-swappable reference to the serving artifact.
pub struct ModelHandle {
    current: RwLock<Arc<InferenceArtifact>>,
    source: RwLock<Option<PathBuf>>,
}

impl ModelHandle {
    pub fn new(artifact: InferenceArtifact) -> Self {
        Self {
            current: RwLock::new(Arc::new(artifact)),
            source: RwLock::new(None),
        }
    }

    /// Load the bundle in `dir` and remember the location for [`Self::reload`].
    pub fn load(dir: &Path) -> Result<Self, PipelineError> {
        let handle = Self::new(InferenceArtifact::load(dir)?);
        *handle.source.write() = Some(dir.to_path_buf());
        Ok(handle)
    }

    /// The artifact predictions should run against right now.
    pub fn current(&self) -> Arc<InferenceArtifact> {
        self.current.read().clone()
    }

    /// Replace the served artifact. Returns the previous one.
    pub fn swap(&self, artifact: InferenceArtifact) -> Arc<InferenceArtifact> {
        std::mem::replace(&mut *self.current.write(), Arc::new(artifact))
    }

    /// Re-read the bundle from the directory it was loaded from.
    ///
    /// The served artifact is untouched if loading fails.
    pub fn reload(&self) -> Result<(), PipelineError> {
        let Some(dir) = self.source.read().clone() else {
            return Err(PipelineError::artifact("handle was not loaded from disk"));
        };
        let fresh = match InferenceArtifact::load(&dir) {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Reload failed, retrying once");
                std::thread::sleep(RELOAD_RETRY_DELAY);
                InferenceArtifact::load(&dir)?
            }
        };
        self.swap(fresh);
        Ok(())
    }

    pub fn predict(&self, rows: &Frame) -> Result<Vec<Label>, PipelineError> {
        self.current().predict(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::Algorithm;
    use crate::data::impute::ImputerStrategy;
    use ndarray::{Array1, array};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn artifact(flip: bool) -> InferenceArtifact {
        let train = Frame::from_rows(
            cols(&["a", "b"]),
            vec![
                vec![Some(-1.0), Some(0.0)],
                vec![Some(1.0), Some(0.0)],
                vec![Some(-1.0), Some(1.0)],
                vec![Some(1.0), Some(1.0)],
            ],
        )
        .unwrap();
        let preprocessor = Preprocessor::fit(&ImputerStrategy::default(), &train).unwrap();
        let x = preprocessor.transform(&train).unwrap();
        let y = if flip {
            Array1::from(vec![1u8, 0, 1, 0])
        } else {
            Array1::from(vec![0u8, 1, 0, 1])
        };
        let model = Algorithm::default_decision_tree()
            .fit(x.view(), y.view())
            .unwrap();
        let metrics = ClassificationMetrics::compute(&y.to_vec(), &y.to_vec());
        InferenceArtifact {
            preprocessor,
            model,
            metadata: ModelMetadata {
                model_name: "decision_tree".into(),
                run_id: "test".into(),
                created_at: Utc::now(),
                selection_metric: Metric::F1,
                train_metrics: metrics.clone(),
                test_metrics: metrics,
                overfit_flagged: false,
            },
        }
    }

    #[test]
    fn test_predict_selects_columns_by_name() {
        let rows = Frame::from_rows(
            cols(&["extra", "b", "a"]),
            vec![vec![Some(9.0), Some(0.0), Some(1.0)], vec![Some(9.0), None, Some(-1.0)]],
        )
        .unwrap();
        let labels = artifact(false).predict(&rows).unwrap();
        assert_eq!(labels, vec![Label::Phishing, Label::Legitimate]);
    }

    #[test]
    fn test_missing_feature_column_is_reported() {
        let rows = Frame::from_rows(cols(&["a"]), vec![vec![Some(1.0)]]).unwrap();
        let err = artifact(false).predict(&rows).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(c) if c == "b"));
    }

    #[test]
    fn test_deploy_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let original = artifact(false);
        let manifest = original.deploy(dir.path()).unwrap();
        assert_eq!(manifest.model_kind, "decision_tree");

        let loaded = InferenceArtifact::load(dir.path()).unwrap();
        assert_eq!(loaded, original);
        let x = array![[1.0, 0.0], [-1.0, 1.0]];
        assert_eq!(
            loaded.predict_matrix(x.view()).unwrap(),
            original.predict_matrix(x.view()).unwrap()
        );
    }

    #[test]
    fn test_tampered_bundle_is_rejected() {
        let dir = TempDir::new().unwrap();
        artifact(false).deploy(dir.path()).unwrap();
        let path = dir.path().join(MODEL_FILE);
        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push(' ');
        std::fs::write(&path, text).unwrap();

        let err = InferenceArtifact::load(dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactLoad(_)));
    }

    #[test]
    fn test_missing_bundle_is_an_artifact_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            InferenceArtifact::load(dir.path()),
            Err(PipelineError::ArtifactLoad(_))
        ));
    }

    #[test]
    fn test_handle_swap_keeps_old_readers_consistent() {
        let handle = ModelHandle::new(artifact(false));
        let before = handle.current();
        let previous = handle.swap(artifact(true));

        assert!(Arc::ptr_eq(&before, &previous));
        let rows = Frame::from_rows(cols(&["a", "b"]), vec![vec![Some(1.0), Some(0.0)]]).unwrap();
        assert_eq!(before.predict(&rows).unwrap(), vec![Label::Phishing]);
        assert_eq!(handle.predict(&rows).unwrap(), vec![Label::Legitimate]);
    }

    #[test]
    fn test_reload_picks_up_redeployed_bundle() {
        let dir = TempDir::new().unwrap();
        artifact(false).deploy(dir.path()).unwrap();
        let handle = ModelHandle::load(dir.path()).unwrap();

        artifact(true).deploy(dir.path()).unwrap();
        handle.reload().unwrap();
        let rows = Frame::from_rows(cols(&["a", "b"]), vec![vec![Some(1.0), Some(0.0)]]).unwrap();
        assert_eq!(handle.predict(&rows).unwrap(), vec![Label::Legitimate]);
        assert!(ModelHandle::new(artifact(false)).reload().is_err());
    }

    #[test]
    fn test_reload_waits_out_a_half_written_deploy() {
        let dir = TempDir::new().unwrap();
        artifact(false).deploy(dir.path()).unwrap();
        let handle = ModelHandle::load(dir.path()).unwrap();

        // New bundle on disk, manifest still describing the old one.
        let next = artifact(true);
        next.save(&dir.path().join(MODEL_FILE)).unwrap();
        let deploy_dir = dir.path().to_path_buf();
        let finisher = {
            let next = next.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                next.deploy(&deploy_dir).unwrap();
            })
        };

        handle.reload().unwrap();
        finisher.join().unwrap();
        assert_eq!(*handle.current(), next);
    }
}
