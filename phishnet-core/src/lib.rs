//! # phishnet-core
//!
//! Building blocks shared by the training pipeline and the CLI:
//! crash-safe file persistence and the heuristic URL feature extractor.

pub mod persistence;
pub mod url_features;

pub use url_features::{FeatureValue, UrlFeatures, extract_url_features, rule_signals};
