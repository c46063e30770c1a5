// SPDX-License-Identifier: MIT

//! Tabular snapshots and where they come from
//!
//! A dataset is a set of named, typed columns of equal length. The JSON form
//! is column-oriented:
//!
//! ```json
//! {"name": "claims", "columns": [{"name": "amount", "kind": "numeric", "values": [1.5, null]}]}
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::error::{GovernorError, Result};

/// Declared kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Boolean,
    Datetime,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Datetime => "datetime",
        };
        write!(f, "{}", name)
    }
}

/// A single value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Hashable identity of a cell, used for distinct and duplicate counting
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum CellKey<'a> {
    Null,
    Bool(bool),
    Number(u64),
    Text(&'a str),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub(crate) fn key(&self) -> CellKey<'_> {
        match self {
            Cell::Null => CellKey::Null,
            Cell::Bool(b) => CellKey::Bool(*b),
            // -0.0 and 0.0 are the same value
            Cell::Number(n) if *n == 0.0 => CellKey::Number(0f64.to_bits()),
            Cell::Number(n) => CellKey::Number(n.to_bits()),
            Cell::Text(s) => CellKey::Text(s),
        }
    }

    /// Rough in-memory footprint in bytes
    fn footprint(&self) -> u64 {
        match self {
            Cell::Null | Cell::Number(_) => 8,
            Cell::Bool(_) => 1,
            Cell::Text(s) => 24 + s.len() as u64,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "null"),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub values: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind, values: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        let values = values
            .into_iter()
            .map(|v| v.map_or(Cell::Null, Cell::Number))
            .collect();
        Self::new(name, ColumnKind::Numeric, values)
    }

    pub fn categorical(name: impl Into<String>, values: Vec<Option<&str>>) -> Self {
        Self::new(name, ColumnKind::Categorical, text_cells(values))
    }

    pub fn boolean(name: impl Into<String>, values: Vec<Option<bool>>) -> Self {
        let values = values
            .into_iter()
            .map(|v| v.map_or(Cell::Null, Cell::Bool))
            .collect();
        Self::new(name, ColumnKind::Boolean, values)
    }

    pub fn datetime(name: impl Into<String>, values: Vec<Option<&str>>) -> Self {
        Self::new(name, ColumnKind::Datetime, text_cells(values))
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|c| c.is_null()).count()
    }

    /// Non-null values as floats, in row order
    pub fn numbers(&self) -> Vec<f64> {
        self.values.iter().filter_map(Cell::as_f64).collect()
    }

    /// Non-null values rendered as category labels, in row order
    pub fn labels(&self) -> Vec<String> {
        self.values
            .iter()
            .filter(|c| !c.is_null())
            .map(|c| c.to_string())
            .collect()
    }

    /// Distinct non-null values
    pub fn distinct_count(&self) -> usize {
        self.values
            .iter()
            .filter(|c| !c.is_null())
            .map(Cell::key)
            .collect::<HashSet<_>>()
            .len()
    }

    fn check_cells(&self) -> Result<()> {
        for (row, cell) in self.values.iter().enumerate() {
            let ok = match (self.kind, cell) {
                (_, Cell::Null) => true,
                (ColumnKind::Numeric, Cell::Number(n)) => n.is_finite(),
                (ColumnKind::Boolean, Cell::Bool(_)) => true,
                (ColumnKind::Categorical, Cell::Text(_) | Cell::Number(_) | Cell::Bool(_)) => true,
                (ColumnKind::Datetime, Cell::Text(s)) => parse_datetime(s),
                _ => false,
            };
            if !ok {
                return Err(GovernorError::input(format!(
                    "column '{}' row {}: value {} is not {}",
                    self.name, row, cell, self.kind
                )));
            }
        }
        Ok(())
    }
}

fn text_cells(values: Vec<Option<&str>>) -> Vec<Cell> {
    values
        .into_iter()
        .map(|v| v.map_or(Cell::Null, |s| Cell::Text(s.to_string())))
        .collect()
}

fn parse_datetime(text: &str) -> bool {
    DateTime::parse_from_rfc3339(text).is_ok()
        || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").is_ok()
}

/// A tabular snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub name: Option<String>,
    pub columns: Vec<Column>,
}

impl Dataset {
    /// Build a dataset, rejecting malformed tables
    pub fn new(name: Option<String>, columns: Vec<Column>) -> Result<Self> {
        let dataset = Self { name, columns };
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let dataset: Dataset = serde_json::from_str(content)
            .map_err(|e| GovernorError::input(format!("malformed dataset document: {}", e)))?;
        dataset.validate()?;
        Ok(dataset)
    }

    /// Check column names are unique, lengths agree and cells match kinds
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.name.is_empty() {
                return Err(GovernorError::input("column with empty name"));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(GovernorError::input(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }

        if let Some(first) = self.columns.first() {
            let rows = first.values.len();
            if let Some(ragged) = self.columns.iter().find(|c| c.values.len() != rows) {
                return Err(GovernorError::input(format!(
                    "ragged columns: '{}' has {} rows, '{}' has {}",
                    first.name,
                    rows,
                    ragged.name,
                    ragged.values.len()
                )));
            }
        }

        self.columns.iter().try_for_each(Column::check_cells)
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Total cells (rows x columns)
    pub fn cell_count(&self) -> usize {
        self.row_count() * self.column_count()
    }

    /// Row `index` as a column name to value map
    pub fn row(&self, index: usize) -> Option<serde_json::Map<String, serde_json::Value>> {
        if index >= self.row_count() {
            return None;
        }
        let mut row = serde_json::Map::new();
        for column in &self.columns {
            let value = serde_json::to_value(&column.values[index]).unwrap_or_default();
            row.insert(column.name.clone(), value);
        }
        Some(row)
    }

    /// Rows identical to an earlier row
    pub fn duplicate_rows(&self) -> usize {
        let mut seen = HashSet::new();
        (0..self.row_count())
            .filter(|&i| {
                let key: Vec<CellKey<'_>> =
                    self.columns.iter().map(|c| c.values[i].key()).collect();
                !seen.insert(key)
            })
            .count()
    }

    pub fn estimated_memory_bytes(&self) -> u64 {
        self.columns
            .iter()
            .map(|c| c.name.len() as u64 + c.values.iter().map(Cell::footprint).sum::<u64>())
            .sum()
    }
}

/// Where datasets are loaded from
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn load(&self, uri: &str) -> Result<Dataset>;
}

/// Loads JSON dataset documents from disk. Relative paths and `file://` URIs
/// resolve against `root`; nothing outside `root` is readable.
#[derive(Debug, Clone)]
pub struct FileDatasetSource {
    root: PathBuf,
}

impl FileDatasetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Canonical path of an existing dataset inside `root`
    pub async fn resolve(&self, uri: &str) -> Result<PathBuf> {
        let requested = PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri));
        let candidate = if requested.is_absolute() {
            requested
        } else {
            self.root.join(requested)
        };

        let root = tokio::fs::canonicalize(&self.root).await.map_err(|e| {
            GovernorError::input(format!("cannot open data root {}: {}", self.root.display(), e))
        })?;
        let path = tokio::fs::canonicalize(&candidate).await.map_err(|e| {
            GovernorError::input(format!("cannot read dataset {}: {}", candidate.display(), e))
        })?;
        if !path.starts_with(&root) {
            return Err(GovernorError::input(format!(
                "dataset {} is outside the data root",
                uri
            )));
        }
        Ok(path)
    }
}

#[async_trait]
impl DatasetSource for FileDatasetSource {
    async fn load(&self, uri: &str) -> Result<Dataset> {
        let path = self.resolve(uri).await?;
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            GovernorError::input(format!("cannot read dataset {}: {}", path.display(), e))
        })?;
        let dataset = Dataset::from_json(&content)?;
        log::debug!(
            "Loaded dataset {} ({} rows, {} columns)",
            uri,
            dataset.row_count(),
            dataset.column_count()
        );
        Ok(dataset)
    }
}

/// Datasets held in memory, keyed by URI
#[derive(Clone, Default)]
pub struct InMemoryDatasetSource {
    datasets: Arc<RwLock<HashMap<String, Dataset>>>,
}

impl InMemoryDatasetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, uri: impl Into<String>, dataset: Dataset) {
        let mut datasets = self.datasets.write().await;
        datasets.insert(uri.into(), dataset);
    }
}

#[async_trait]
impl DatasetSource for InMemoryDatasetSource {
    async fn load(&self, uri: &str) -> Result<Dataset> {
        let datasets = self.datasets.read().await;
        datasets
            .get(uri)
            .cloned()
            .ok_or_else(|| GovernorError::input(format!("dataset not found: {}", uri)))
    }
}
