//! Tabular record container shared by every pipeline stage.
//!
//! A [`Frame`] is the validated row structure the pipeline passes around:
//! an ordered, duplicate-free column list and rows of exactly that width.
//! Every cell is numeric; `None` is the universal missing marker.

use crate::error::PipelineError;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;

/// Ordered numeric table with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Option<f64>>>,
}

impl Frame {
    /// Create an empty frame with the given columns.
    pub fn new(columns: Vec<String>) -> Result<Self, PipelineError> {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(PipelineError::validation(format!(
                    "duplicate column `{name}`"
                )));
            }
        }
        Ok(Self {
            columns,
            index,
            rows: Vec::new(),
        })
    }

    /// Create a frame and fill it, checking every row's width.
    pub fn from_rows(
        columns: Vec<String>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, PipelineError> {
        let mut frame = Self::new(columns)?;
        frame.rows.reserve(rows.len());
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    pub fn push_row(&mut self, row: Vec<Option<f64>>) -> Result<(), PipelineError> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::validation(format!(
                "row {} has {} values, expected {}",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// Observed (non-null) values of one column.
    pub fn observed(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row[idx]).collect())
    }

    /// Remove a column if present. Returns whether it existed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.index.remove(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        true
    }

    /// Append a column. Fails on a duplicate name or a length mismatch.
    pub fn push_column(
        &mut self,
        name: &str,
        values: Vec<Option<f64>>,
    ) -> Result<(), PipelineError> {
        if self.has_column(name) {
            return Err(PipelineError::validation(format!(
                "duplicate column `{name}`"
            )));
        }
        if values.len() != self.rows.len() {
            return Err(PipelineError::validation(format!(
                "column `{name}` has {} values, frame has {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        self.index.insert(name.to_string(), self.columns.len());
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Project onto `names`, in that order. Extra columns are ignored.
    pub fn select(&self, names: &[String]) -> Result<Frame, PipelineError> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| PipelineError::missing_column(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect();
        Frame::from_rows(names.to_vec(), rows)
    }

    /// New frame holding the rows at `indices`, in that order.
    pub fn take_rows(&self, indices: &[usize]) -> Frame {
        Frame {
            columns: self.columns.clone(),
            index: self.index.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Parse CSV text. Header row first; empty cells and `sentinels` become null.
    pub fn parse_csv(content: &str, sentinels: &[String]) -> Result<Frame, PipelineError> {
        let mut lines = content.lines();
        let header = lines
            .next()
            .ok_or_else(|| invalid_data("empty CSV input".to_string()))?;
        let columns: Vec<String> = header
            .split(',')
            .map(|s| s.trim().trim_matches('"').to_string())
            .collect();
        let mut frame = Frame::new(columns)?;

        for (line_no, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row = line
                .split(',')
                .map(|cell| parse_cell(cell, sentinels))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid_data(format!("line {}: {e}", line_no + 2)))?;
            if row.len() != frame.column_count() {
                return Err(invalid_data(format!(
                    "line {}: {} fields, expected {}",
                    line_no + 2,
                    row.len(),
                    frame.column_count()
                )));
            }
            frame.rows.push(row);
        }
        Ok(frame)
    }

    /// Read a CSV file written by [`Frame::write_csv`] (or any numeric CSV).
    pub fn read_csv(path: &Path) -> Result<Frame, PipelineError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_csv(&content, &[])
    }

    /// Serialize as CSV; nulls are written as empty cells.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "{}", self.columns.join(","))?;
        for row in &self.rows {
            let line: Vec<String> = row
                .iter()
                .map(|v| v.map(|x| x.to_string()).unwrap_or_default())
                .collect();
            writeln!(w, "{}", line.join(","))?;
        }
        Ok(())
    }

    /// Atomically write the frame to `path` as CSV.
    pub fn write_csv(&self, path: &Path) -> Result<(), PipelineError> {
        phishnet_core::persistence::atomic_write_with(path, |w| self.write_to(w))?;
        Ok(())
    }
}

/// CSV rows kept as text, for inputs that carry columns the model never reads.
///
/// Only the columns handed to [`RawTable::numeric`] are parsed; every other
/// cell is written back exactly as read.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn parse_csv(content: &str) -> Result<Self, PipelineError> {
        let mut lines = content.lines();
        let header = lines
            .next()
            .ok_or_else(|| PipelineError::validation("empty CSV input"))?;
        let columns: Vec<String> = header
            .split(',')
            .map(|s| s.trim().trim_matches('"').to_string())
            .collect();
        // Reject duplicate headers up front.
        Frame::new(columns.clone())?;

        let mut rows = Vec::new();
        for (line_no, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row: Vec<String> = line.split(',').map(str::to_string).collect();
            if row.len() != columns.len() {
                return Err(PipelineError::validation(format!(
                    "line {}: {} fields, expected {}",
                    line_no + 2,
                    row.len(),
                    columns.len()
                )));
            }
            rows.push(row);
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Parse `names` into a numeric [`Frame`], in that order.
    pub fn numeric(&self, names: &[String], sentinels: &[String]) -> Result<Frame, PipelineError> {
        let indices = names
            .iter()
            .map(|name| {
                self.columns
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| PipelineError::missing_column(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut frame = Frame::new(names.to_vec())?;
        for (row_no, row) in self.rows.iter().enumerate() {
            let values = indices
                .iter()
                .map(|&i| {
                    parse_cell(&row[i], sentinels).map_err(|e| {
                        PipelineError::validation(format!(
                            "row {}, column `{}`: {e}",
                            row_no + 1,
                            self.columns[i]
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            frame.push_row(values)?;
        }
        Ok(frame)
    }

    /// Append a text column. Fails on a duplicate name or a length mismatch.
    pub fn push_column(&mut self, name: &str, values: Vec<String>) -> Result<(), PipelineError> {
        if self.columns.iter().any(|c| c == name) {
            return Err(PipelineError::validation(format!(
                "duplicate column `{name}`"
            )));
        }
        if values.len() != self.rows.len() {
            return Err(PipelineError::validation(format!(
                "column `{name}` has {} values, table has {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "{}", self.columns.join(","))?;
        for row in &self.rows {
            writeln!(w, "{}", row.join(","))?;
        }
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), PipelineError> {
        phishnet_core::persistence::atomic_write_with(path, |w| self.write_to(w))?;
        Ok(())
    }
}

/// Parse one raw cell. Empty strings and sentinels map to `None`.
pub fn parse_cell(raw: &str, sentinels: &[String]) -> Result<Option<f64>, String> {
    let cell = raw.trim().trim_matches('"');
    if cell.is_empty() || sentinels.iter().any(|s| s == cell) {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("non-numeric value `{cell}`"))
}

fn invalid_data(msg: String) -> PipelineError {
    PipelineError::Io(io::Error::new(io::ErrorKind::InvalidData, msg))
}
