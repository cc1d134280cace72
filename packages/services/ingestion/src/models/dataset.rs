use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::ValidationResult;

/// Row-oriented table as read from a CSV file. `None` cells are missing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Values of one column, top to bottom.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).and_then(|cell| cell.as_deref()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextEncoding {
    Latin1,
    Utf8,
}

impl TextEncoding {
    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Latin1 => "ISO-8859-1",
            TextEncoding::Utf8 => "UTF-8",
        }
    }
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Uploaded table that is not yet authoritative.
#[derive(Debug, Clone)]
pub struct CandidateDataset {
    pub filename: String,
    pub encoding: TextEncoding,
    pub table: Table,
    pub validation: Option<ValidationResult>,
}

impl CandidateDataset {
    pub fn new(filename: impl Into<String>, encoding: TextEncoding, table: Table) -> Self {
        Self {
            filename: filename.into(),
            encoding,
            table,
            validation: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validation.as_ref().map(|v| v.valid).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentEnvironment {
    Container,
    Local,
}

/// Operator-facing metadata about the active dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStatus {
    pub path: PathBuf,
    pub filename: String,
    pub exists: bool,
    pub rows: Option<usize>,
    pub columns: Option<usize>,
    pub column_names: Vec<String>,
    pub size_bytes: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
    pub environment: DeploymentEnvironment,
    pub backup_dir: PathBuf,
    pub backup_count: usize,
    pub read_error: Option<String>,
}

impl DatasetStatus {
    pub fn size_kb(&self) -> Option<f64> {
        self.size_bytes.map(|b| b as f64 / 1024.0)
    }
}
