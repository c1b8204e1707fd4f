//! Data stages of the training pipeline and the types they share.

pub mod drift;
pub mod frame;
pub mod impute;
pub mod ingest;
pub mod schema;
pub mod source;
pub mod storage;
pub mod transform;
pub mod validate;

pub use frame::{Frame, RawTable};
pub use impute::{FittedImputer, ImputerStrategy};
pub use ingest::DataIngestion;
pub use schema::{ColumnSpec, ColumnType, SchemaCheck, SchemaSpec};
pub use source::{DataBatch, MemoryStore, RecordStore, SourceInfo, SqliteStore};
pub use storage::RunWorkspace;
pub use transform::{DataTransformation, Preprocessor, TransformedMatrix};
pub use validate::{ColumnDrift, DataValidation, ValidationReport};
