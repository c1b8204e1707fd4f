//! # phishnet-ml: phishing-URL classifier training pipeline
//!
//! Turns labeled URL feature records into a deployable inference bundle:
//!
//! 1. **Ingestion**: read the record store, clean, split train/test with a seed
//! 2. **Validation**: schema conformance and per-column KS drift
//! 3. **Transformation**: fit an imputer on train, build dense matrices
//! 4. **Training**: fit candidates, select, gate, deploy
//!
//! [`pipeline::TrainingPipeline`] sequences the stages;
//! [`inference::InferenceArtifact`] serves the result.

// Foundation
pub mod artifact;
pub mod config;
pub mod error;

// Stages
pub mod data;
pub mod training;

// Models
pub mod algorithms;

// Orchestration & serving
pub mod inference;
pub mod pipeline;

// Re-exports
pub use config::{PipelineConfig, load_config};
pub use data::{Frame, MemoryStore, RecordStore, SchemaSpec, SqliteStore};
pub use error::{PipelineError, Stage, StageFailure};
pub use inference::{InferenceArtifact, Label, ModelHandle};
pub use pipeline::{PipelineContext, PipelineRun, RunState, TrainingPipeline};
