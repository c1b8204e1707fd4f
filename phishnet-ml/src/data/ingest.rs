//! Data ingestion: store → cleaned frame → seeded train/test split.

use crate::artifact::DataIngestionArtifact;
use crate::config::IngestionConfig;
use crate::data::frame::{Frame, parse_cell};
use crate::data::source::{DataBatch, RecordStore};
use crate::data::storage::RunWorkspace;
use crate::error::PipelineError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, info};

/// Reads the configured collection and writes the train/test split.
pub struct DataIngestion {
    store: Arc<dyn RecordStore>,
    config: IngestionConfig,
    workspace: RunWorkspace,
}

impl DataIngestion {
    pub fn new(
        store: Arc<dyn RecordStore>,
        config: IngestionConfig,
        workspace: RunWorkspace,
    ) -> Self {
        Self {
            store,
            config,
            workspace,
        }
    }

    pub async fn initiate(&self) -> Result<DataIngestionArtifact, PipelineError> {
        let collection = &self.config.collection;
        info!(collection = %collection, "Reading records from store");

        let batch = self.store.fetch(collection).await?;
        let frame = clean_batch(batch, &self.config.id_column, &self.config.missing_sentinels)?;
        if frame.is_empty() {
            return Err(PipelineError::ingestion(format!(
                "collection `{collection}` returned no records"
            )));
        }

        let feature_store_file = self
            .workspace
            .feature_store_file(&self.config.feature_store_file);
        frame.write_csv(&feature_store_file)?;
        debug!(
            path = %feature_store_file.display(),
            rows = frame.row_count(),
            "Exported feature store"
        );

        let (train, test) = split_frame(&frame, self.config.test_ratio, self.config.seed)?;
        let train_file = self.workspace.ingested_train_file();
        let test_file = self.workspace.ingested_test_file();
        train.write_csv(&train_file)?;
        test.write_csv(&test_file)?;

        info!(
            train_rows = train.row_count(),
            test_rows = test.row_count(),
            seed = self.config.seed,
            "Data ingestion completed"
        );

        Ok(DataIngestionArtifact {
            feature_store_file,
            train_file,
            test_file,
            train_rows: train.row_count(),
            test_rows: test.row_count(),
            source: self.store.source_info(collection),
        })
    }
}

/// Turn raw store records into a numeric frame.
///
/// Drops `id_column`, maps `sentinels` and JSON nulls to `None`, and rejects
/// any value that isn't numeric.
pub fn clean_batch(
    batch: DataBatch,
    id_column: &str,
    sentinels: &[String],
) -> Result<Frame, PipelineError> {
    let keep: Vec<usize> = batch
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| name.as_str() != id_column)
        .map(|(i, _)| i)
        .collect();
    let columns = keep.iter().map(|&i| batch.columns[i].clone()).collect();
    let mut frame = Frame::new(columns)?;

    for (row_idx, row) in batch.rows.into_iter().enumerate() {
        if row.len() != batch.columns.len() {
            return Err(PipelineError::ingestion(format!(
                "record {row_idx} has {} fields, expected {}",
                row.len(),
                batch.columns.len()
            )));
        }
        let mut values = Vec::with_capacity(keep.len());
        for &i in &keep {
            let value = match &row[i] {
                serde_json::Value::Null => None,
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                serde_json::Value::String(s) => parse_cell(s, sentinels).map_err(|e| {
                    PipelineError::ingestion(format!(
                        "record {row_idx}, column `{}`: {e}",
                        batch.columns[i]
                    ))
                })?,
                other => {
                    return Err(PipelineError::ingestion(format!(
                        "record {row_idx}, column `{}`: unsupported value {other}",
                        batch.columns[i]
                    )));
                }
            };
            values.push(value);
        }
        frame.push_row(values)?;
    }
    Ok(frame)
}

/// Shuffle row indices with `seed` and hold out `ceil(n * test_ratio)` rows.
///
/// Returns `(train, test)` index lists; both are non-empty and disjoint.
pub fn split_indices(
    n: usize,
    test_ratio: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), PipelineError> {
    if n < 2 {
        return Err(PipelineError::ingestion(format!(
            "need at least 2 records to split, got {n}"
        )));
    }
    let n_test = ((n as f64 * test_ratio).ceil() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok((train, indices))
}

pub fn split_frame(
    frame: &Frame,
    test_ratio: f64,
    seed: u64,
) -> Result<(Frame, Frame), PipelineError> {
    let (train_idx, test_idx) = split_indices(frame.row_count(), test_ratio, seed)?;
    Ok((frame.take_rows(&train_idx), frame.take_rows(&test_idx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn batch(n: usize) -> DataBatch {
        DataBatch {
            columns: vec!["_id".into(), "x".into(), "Result".into()],
            rows: (0..n)
                .map(|i| {
                    vec![
                        serde_json::json!(format!("oid-{i}")),
                        serde_json::json!(i as f64),
                        serde_json::json!(if i % 2 == 0 { 1 } else { -1 }),
                    ]
                })
                .collect(),
        }
    }

    #[test]
    fn test_clean_batch_drops_id_and_maps_sentinels() {
        let raw = DataBatch {
            columns: vec!["_id".into(), "a".into(), "b".into()],
            rows: vec![vec![
                serde_json::json!(7),
                serde_json::json!("na"),
                serde_json::json!("3"),
            ]],
        };
        let frame = clean_batch(raw, "_id", &["na".to_string()]).unwrap();
        assert_eq!(frame.columns(), &["a".to_string(), "b".to_string()][..]);
        assert_eq!(frame.rows()[0], vec![None, Some(3.0)]);
    }

    #[test]
    fn test_clean_batch_rejects_text() {
        let raw = DataBatch {
            columns: vec!["a".into()],
            rows: vec![vec![serde_json::json!("phish")]],
        };
        let err = clean_batch(raw, "_id", &[]).unwrap_err();
        assert!(matches!(err, PipelineError::Ingestion(_)));
    }

    #[test]
    fn test_split_is_disjoint_and_sized() {
        let (train, test) = split_indices(100, 0.2, 42).unwrap();
        assert_eq!(test.len(), 20);
        assert_eq!(train.len(), 80);
        let all: HashSet<usize> = train.iter().chain(test.iter()).copied().collect();
        assert_eq!(all.len(), 100);
    }

    #[test]
    fn test_split_rounds_test_size_up() {
        let (train, test) = split_indices(11, 0.2, 1).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);
    }

    #[test]
    fn test_split_is_deterministic_for_a_seed() {
        assert_eq!(
            split_indices(50, 0.2, 7).unwrap(),
            split_indices(50, 0.2, 7).unwrap()
        );
        assert_ne!(
            split_indices(50, 0.2, 7).unwrap(),
            split_indices(50, 0.2, 8).unwrap()
        );
    }

    #[tokio::test]
    async fn test_ingest_twice_gives_identical_membership() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn RecordStore> =
            Arc::new(MemoryStore::with_batch("NetworkData", batch(40)));
        let config = IngestionConfig::default();

        let first = DataIngestion::new(
            store.clone(),
            config.clone(),
            RunWorkspace::new(&dir.path().join("a")),
        )
        .initiate()
        .await
        .unwrap();
        let second = DataIngestion::new(store, config, RunWorkspace::new(&dir.path().join("b")))
            .initiate()
            .await
            .unwrap();

        assert_eq!(first.train_rows, 32);
        assert_eq!(first.test_rows, 8);
        assert_eq!(
            Frame::read_csv(&first.train_file).unwrap(),
            Frame::read_csv(&second.train_file).unwrap()
        );
        assert_eq!(
            Frame::read_csv(&first.test_file).unwrap(),
            Frame::read_csv(&second.test_file).unwrap()
        );
        assert!(first.feature_store_file.exists());
    }

    #[tokio::test]
    async fn test_empty_collection_fails() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn RecordStore> =
            Arc::new(MemoryStore::with_batch("NetworkData", batch(0)));
        let err = DataIngestion::new(
            store,
            IngestionConfig::default(),
            RunWorkspace::new(dir.path()),
        )
        .initiate()
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Ingestion(_)));
    }
}
