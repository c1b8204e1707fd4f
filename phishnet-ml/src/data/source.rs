//! Record store abstraction the ingestion stage reads from.

use crate::data::frame::Frame;
use crate::error::PipelineError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// A batch of raw records as returned by a store, before any cleaning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl DataBatch {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Information about a store read, for logs and artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub store_type: String,
    pub database: String,
    pub collection: String,
    pub accessed_at: chrono::DateTime<chrono::Utc>,
}

/// A queryable store of labeled records keyed by collection name.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read every record of `collection`.
    async fn fetch(&self, collection: &str) -> Result<DataBatch, PipelineError>;

    /// Replace the contents of `collection` with `frame`. Returns rows written.
    async fn replace(&self, collection: &str, frame: &Frame) -> Result<usize, PipelineError>;

    fn source_info(&self, collection: &str) -> SourceInfo;
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// SQLite-backed record store: the database is a file, collections are tables.
pub struct SqliteStore {
    pub db_path: PathBuf,
    /// Identifier column added on `replace`, mirroring document stores.
    pub id_column: String,
}

impl SqliteStore {
    pub fn new(db_path: impl Into<PathBuf>, id_column: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            id_column: id_column.into(),
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn fetch(&self, collection: &str) -> Result<DataBatch, PipelineError> {
        if !self.db_path.exists() {
            return Err(PipelineError::ingestion(format!(
                "record store {} is unreachable",
                self.db_path.display()
            )));
        }
        let db_path = self.db_path.clone();
        let query = format!("SELECT * FROM {}", quote_ident(collection));

        // Run blocking SQLite operations on a blocking thread
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
            )?;
            let mut stmt = conn.prepare(&query)?;
            let column_count = stmt.column_count();
            let columns: Vec<String> = (0..column_count)
                .map(|i| stmt.column_name(i).unwrap_or("?").to_string())
                .collect();

            let mut rows = Vec::new();
            let mut result_rows = stmt.query([])?;
            while let Some(row) = result_rows.next()? {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    let val = match row.get_ref(i)? {
                        rusqlite::types::ValueRef::Null => serde_json::Value::Null,
                        rusqlite::types::ValueRef::Integer(n) => serde_json::json!(n),
                        rusqlite::types::ValueRef::Real(f) => serde_json::Number::from_f64(f)
                            .map(serde_json::Value::Number)
                            .unwrap_or(serde_json::Value::Null),
                        rusqlite::types::ValueRef::Text(t) => {
                            serde_json::Value::String(String::from_utf8_lossy(t).into_owned())
                        }
                        rusqlite::types::ValueRef::Blob(_) => {
                            serde_json::Value::String("<blob>".to_string())
                        }
                    };
                    values.push(val);
                }
                rows.push(values);
            }
            Ok(DataBatch { columns, rows })
        })
        .await
        .map_err(|e| PipelineError::ingestion(format!("SQLite task join error: {e}")))?
    }

    async fn replace(&self, collection: &str, frame: &Frame) -> Result<usize, PipelineError> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let db_path = self.db_path.clone();
        let table = quote_ident(collection);
        let id_column = quote_ident(&self.id_column);
        let frame = frame.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = rusqlite::Connection::open(&db_path)?;
            let tx = conn.transaction()?;
            tx.execute(&format!("DROP TABLE IF EXISTS {table}"), [])?;

            let column_defs: Vec<String> = frame
                .columns()
                .iter()
                .map(|c| format!("{} REAL", quote_ident(c)))
                .collect();
            tx.execute(
                &format!(
                    "CREATE TABLE {table} ({id_column} INTEGER PRIMARY KEY, {})",
                    column_defs.join(", ")
                ),
                [],
            )?;

            let names: Vec<String> = frame.columns().iter().map(|c| quote_ident(c)).collect();
            let placeholders = vec!["?"; names.len()].join(", ");
            let insert = format!(
                "INSERT INTO {table} ({}) VALUES ({placeholders})",
                names.join(", ")
            );
            {
                let mut stmt = tx.prepare(&insert)?;
                for row in frame.rows() {
                    stmt.execute(rusqlite::params_from_iter(row.iter()))?;
                }
            }
            tx.commit()?;
            Ok(frame.row_count())
        })
        .await
        .map_err(|e| PipelineError::ingestion(format!("SQLite task join error: {e}")))?
    }

    fn source_info(&self, collection: &str) -> SourceInfo {
        SourceInfo {
            store_type: "sqlite".to_string(),
            database: self.db_path.display().to_string(),
            collection: collection.to_string(),
            accessed_at: chrono::Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process record store, used for tests and for piping CSV data straight
/// into a pipeline run.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, DataBatch>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch(collection: &str, batch: DataBatch) -> Self {
        let store = Self::new();
        store.collections.write().insert(collection.to_string(), batch);
        store
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch(&self, collection: &str) -> Result<DataBatch, PipelineError> {
        self.collections
            .read()
            .get(collection)
            .cloned()
            .ok_or_else(|| PipelineError::ingestion(format!("unknown collection `{collection}`")))
    }

    async fn replace(&self, collection: &str, frame: &Frame) -> Result<usize, PipelineError> {
        let rows = frame
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| {
                        v.and_then(serde_json::Number::from_f64)
                            .map(serde_json::Value::Number)
                            .unwrap_or(serde_json::Value::Null)
                    })
                    .collect()
            })
            .collect();
        let batch = DataBatch {
            columns: frame.columns().to_vec(),
            rows,
        };
        let count = batch.row_count();
        self.collections
            .write()
            .insert(collection.to_string(), batch);
        Ok(count)
    }

    fn source_info(&self, collection: &str) -> SourceInfo {
        SourceInfo {
            store_type: "memory".to_string(),
            database: "memory".to_string(),
            collection: collection.to_string(),
            accessed_at: chrono::Utc::now(),
        }
    }
}
