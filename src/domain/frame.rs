//! In-memory tabular data and its CSV file boundary.
//!
//! A `DataFrame` is a row-major table of loosely typed cells. Cells parse
//! the way a CSV reader would see them: empty means missing, anything that
//! parses as a float is a number, everything else is text.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value as Json};

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    /// Parse a raw CSV field
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }

        match trimmed.parse::<f64>() {
            Ok(n) if n.is_nan() => Value::Null,
            Ok(n) => Value::Number(n),
            Err(_) => Value::Text(trimmed.to_string()),
        }
    }

    /// Convert a document field, mapping the source's missing-value sentinel to `Null`
    pub fn from_json(value: &Json, missing_marker: &str) -> Self {
        match value {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Number(if *b { 1.0 } else { 0.0 }),
            Json::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            Json::String(s) if s == missing_marker => Value::Null,
            Json::String(s) => Value::parse(s),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Total order used by the drift test: nulls first, then numbers, then text
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Number(_), Value::Text(_)) => Ordering::Less,
            (Value::Text(_), Value::Number(_)) => Ordering::Greater,
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Row-major table with named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl DataFrame {
    /// Create an empty frame with the given header
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a frame from a header and rows of matching width
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut frame = Self::new(columns);
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    /// Build a frame from documents.
    ///
    /// Columns are the union of document keys in first-seen order; a key
    /// missing from a document becomes `Null` in that row.
    pub fn from_documents(documents: &[Map<String, Json>], missing_marker: &str) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            for key in doc.keys() {
                if !index.contains_key(key) {
                    index.insert(key.clone(), columns.len());
                    columns.push(key.clone());
                }
            }
        }

        let rows = documents
            .iter()
            .map(|doc| {
                columns
                    .iter()
                    .map(|col| {
                        doc.get(col)
                            .map(|v| Value::from_json(v, missing_marker))
                            .unwrap_or(Value::Null)
                    })
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Append a row; its width must match the header
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            anyhow::bail!(
                "Row has {} cells but frame has {} columns",
                row.len(),
                self.columns.len()
            );
        }
        self.rows.push(row);
        Ok(())
    }

    /// Remove the named columns; every name must exist
    pub fn drop_columns(&self, names: &[String]) -> Result<DataFrame> {
        let missing: Vec<&String> = names.iter().filter(|n| !self.has_column(n)).collect();
        if !missing.is_empty() {
            anyhow::bail!("Columns not found in frame: {:?}", missing);
        }

        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&i| !names.contains(&self.columns[i]))
            .collect();

        Ok(self.project(&keep))
    }

    /// Remove the named columns that exist, ignoring the rest
    pub fn drop_columns_lenient(&self, names: &[String]) -> DataFrame {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&i| !names.contains(&self.columns[i]))
            .collect();
        self.project(&keep)
    }

    /// Split off one column, returning the remaining frame and that column's cells
    pub fn split_column(&self, name: &str) -> Result<(DataFrame, Vec<Value>)> {
        let idx = self
            .column_index(name)
            .with_context(|| format!("Column '{}' not found in frame", name))?;

        let target = self.rows.iter().map(|row| row[idx].clone()).collect();
        let keep: Vec<usize> = (0..self.columns.len()).filter(|&i| i != idx).collect();

        Ok((self.project(&keep), target))
    }

    /// Append a column at the right edge
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<Value>) -> Result<Self> {
        if values.len() != self.rows.len() {
            anyhow::bail!(
                "Column has {} values but frame has {} rows",
                values.len(),
                self.rows.len()
            );
        }
        self.columns.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(self)
    }

    /// Rows at the given indices, in that order
    pub fn select_rows(&self, indices: &[usize]) -> DataFrame {
        Self {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Stack another frame with the same header below this one
    pub fn concat(&self, other: &DataFrame) -> Result<DataFrame> {
        if self.columns != other.columns {
            anyhow::bail!("Cannot concatenate frames with different columns");
        }
        let mut rows = self.rows.clone();
        rows.extend(other.rows.iter().cloned());
        Ok(Self {
            columns: self.columns.clone(),
            rows,
        })
    }

    fn project(&self, keep: &[usize]) -> DataFrame {
        Self {
            columns: keep.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }

    // ------------------------------------------------------------------
    // CSV boundary
    // ------------------------------------------------------------------

    /// Parse CSV with a header row
    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut frame = Self::new(columns);
        for (line, record) in csv_reader.records().enumerate() {
            let record = record.with_context(|| format!("Failed to read CSV record {}", line + 1))?;
            frame.push_row(record.iter().map(Value::parse).collect())?;
        }

        Ok(frame)
    }

    /// Serialize to CSV with a header row and no index column
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .context("Failed to write CSV header")?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|v| v.to_string()))
                .context("Failed to write CSV record")?;
        }
        writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV buffer: {}", e))
    }

    /// Read a CSV file
    pub async fn read_csv(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;

        Self::from_csv_reader(bytes.as_slice())
            .with_context(|| format!("Failed to parse CSV file: {}", path.display()))
    }

    /// Write a CSV file, creating parent directories
    pub async fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        let bytes = self.to_csv_bytes()?;
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("Failed to write CSV file: {}", path.display()))
    }
}
