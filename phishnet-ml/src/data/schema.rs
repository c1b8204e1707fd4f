//! Schema registry: the expected column set of the raw dataset.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Column data type as declared in the schema file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "float64")]
    Float64,
}

/// Schema for a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: ColumnType,
}

/// On-disk layout: `columns` is a list of single-entry `name: type` maps.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    columns: Vec<BTreeMap<String, ColumnType>>,
    #[serde(default)]
    numerical_columns: Vec<String>,
    #[serde(default = "default_target_column")]
    target_column: String,
}

fn default_target_column() -> String {
    "Result".to_string()
}

/// Expected shape of the raw dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSpec {
    columns: Vec<ColumnSpec>,
    numerical_columns: Vec<String>,
    target_column: String,
}

/// Outcome of comparing a dataset's columns against the schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCheck {
    pub expected_columns: usize,
    pub actual_columns: usize,
    /// Schema columns absent from the dataset.
    pub missing: Vec<String>,
    /// Dataset columns the schema doesn't declare.
    pub unexpected: Vec<String>,
}

impl SchemaCheck {
    pub fn passed(&self) -> bool {
        self.expected_columns == self.actual_columns
            && self.missing.is_empty()
            && self.unexpected.is_empty()
    }
}

impl SchemaSpec {
    /// Build a schema, checking that its declared column lists agree.
    pub fn new(
        columns: Vec<ColumnSpec>,
        numerical_columns: Vec<String>,
        target_column: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let target_column = target_column.into();
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "schema declares `{}` twice",
                    col.name
                )));
            }
        }
        if !seen.contains(target_column.as_str()) {
            return Err(PipelineError::Config(format!(
                "target column `{target_column}` is not declared in the schema"
            )));
        }
        if let Some(unknown) = numerical_columns
            .iter()
            .find(|c| !seen.contains(c.as_str()))
        {
            return Err(PipelineError::Config(format!(
                "numerical column `{unknown}` is not declared in the schema"
            )));
        }
        Ok(Self {
            columns,
            numerical_columns,
            target_column,
        })
    }

    /// Parse the YAML schema format.
    pub fn from_yaml_str(content: &str) -> Result<Self, PipelineError> {
        let file: SchemaFile = serde_yaml::from_str(content)?;
        let mut columns = Vec::with_capacity(file.columns.len());
        for entry in file.columns {
            if entry.len() != 1 {
                return Err(PipelineError::Config(format!(
                    "schema column entries must have exactly one `name: type` pair, got {}",
                    entry.len()
                )));
            }
            for (name, dtype) in entry {
                columns.push(ColumnSpec { name, dtype });
            }
        }
        Self::new(columns, file.numerical_columns, file.target_column)
    }

    /// Load the schema file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read schema {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn numerical_columns(&self) -> &[String] {
        &self.numerical_columns
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    /// Every declared column except the target, in schema order.
    pub fn feature_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.name != self.target_column)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Compare a dataset's column names against the schema.
    ///
    /// Order doesn't matter; count and names must match exactly.
    pub fn check_columns(&self, actual: &[String]) -> SchemaCheck {
        let expected: HashSet<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        let present: HashSet<&str> = actual.iter().map(String::as_str).collect();

        SchemaCheck {
            expected_columns: self.columns.len(),
            actual_columns: actual.len(),
            missing: self
                .columns
                .iter()
                .filter(|c| !present.contains(c.name.as_str()))
                .map(|c| c.name.clone())
                .collect(),
            unexpected: actual
                .iter()
                .filter(|c| !expected.contains(c.as_str()))
                .cloned()
                .collect(),
        }
    }
}
