//! Schema registry: the static column contract shared by ingestion and validation.
//!
//! The schema file is YAML:
//!
//! ```yaml
//! target_column: class
//! columns:
//!   - class: category
//!   - aa_000: int64
//! numerical_columns:
//!   - aa_000
//! drop_columns:
//!   - br_000
//! ```
//!
//! `columns` describes the modelling frame, i.e. what remains after
//! ingestion has removed `drop_columns`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Raw schema file (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaFile {
    #[serde(default = "default_target_column")]
    pub target_column: String,

    /// One single-entry map per column: `name: dtype`
    pub columns: Vec<BTreeMap<String, String>>,

    #[serde(default)]
    pub numerical_columns: Vec<String>,

    #[serde(default)]
    pub drop_columns: Vec<String>,
}

fn default_target_column() -> String {
    "class".to_string()
}

/// Intended role of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Feature,
    Target,
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: String,
    pub kind: ColumnKind,
}

/// Read-only column contract for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
    numerical_columns: Vec<String>,
    drop_columns: Vec<String>,
    target_column: String,
}

impl Schema {
    /// Load a schema from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            what: "schema file",
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Malformed { message, .. } => ConfigError::Malformed {
                what: "schema file",
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Parse a schema from YAML content
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let raw: SchemaFile = serde_yaml::from_str(content).map_err(|e| ConfigError::Malformed {
            what: "schema",
            path: Default::default(),
            message: e.to_string(),
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: SchemaFile) -> Result<Self, ConfigError> {
        let malformed = |message: String| ConfigError::Malformed {
            what: "schema",
            path: Default::default(),
            message,
        };

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(raw.columns.len());

        for entry in raw.columns {
            if entry.len() != 1 {
                return Err(malformed(format!(
                    "column entries must be single `name: dtype` pairs, got {} keys",
                    entry.len()
                )));
            }
            let Some((name, dtype)) = entry.into_iter().next() else {
                continue;
            };
            if !seen.insert(name.clone()) {
                return Err(malformed(format!("column '{}' declared twice", name)));
            }
            let kind = if name == raw.target_column {
                ColumnKind::Target
            } else {
                ColumnKind::Feature
            };
            columns.push(ColumnSpec { name, dtype, kind });
        }

        if !seen.contains(&raw.target_column) {
            return Err(malformed(format!(
                "target column '{}' is not among the declared columns",
                raw.target_column
            )));
        }

        if let Some(name) = raw.numerical_columns.iter().find(|n| !seen.contains(*n)) {
            return Err(malformed(format!(
                "numerical column '{}' is not among the declared columns",
                name
            )));
        }

        // Dropped columns are removed before validation counts columns
        if let Some(name) = raw.drop_columns.iter().find(|n| seen.contains(*n)) {
            return Err(malformed(format!(
                "column '{}' is both declared and dropped",
                name
            )));
        }

        Ok(Self {
            columns,
            numerical_columns: raw.numerical_columns,
            drop_columns: raw.drop_columns,
            target_column: raw.target_column,
        })
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Number of columns a validated partition must have
    pub fn expected_column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn numerical_columns(&self) -> &[String] {
        &self.numerical_columns
    }

    pub fn drop_columns(&self) -> &[String] {
        &self.drop_columns
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    /// Role of a column name, if the schema knows it
    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        if self.drop_columns.iter().any(|d| d == name) {
            return Some(ColumnKind::Dropped);
        }
        self.columns.iter().find(|c| c.name == name).map(|c| c.kind)
    }
}
