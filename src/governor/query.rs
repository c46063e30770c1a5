// SPDX-License-Identifier: MIT

//! Query engine seam and its DataFusion implementation
//!
//! Each call builds a fresh `SessionContext` with the referenced dataset
//! registered as an in-memory table, so queries never see state from other
//! runs.

use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::datasource::MemTable;
use datafusion::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::dataset::{Cell, ColumnKind, Dataset, DatasetSource};
use super::error::{GovernorError, Result};

/// A dataset exposed to SQL under a table name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub dataset_uri: String,
    pub table_name: String,
}

impl TableRef {
    pub fn new(dataset_uri: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            dataset_uri: dataset_uri.into(),
            table_name: table_name.into(),
        }
    }
}

/// Executes SQL against a referenced table
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Run a query and return the number of rows it produced
    async fn execute(&self, table: &TableRef, sql: &str) -> Result<u64>;

    /// Column names and SQL types of the table
    async fn describe_schema(&self, table: &TableRef) -> Result<Vec<(String, String)>>;
}

/// DataFusion over datasets from a `DatasetSource`
pub struct DataFusionQueryEngine {
    source: Arc<dyn DatasetSource>,
}

impl DataFusionQueryEngine {
    pub fn new(source: Arc<dyn DatasetSource>) -> Self {
        Self { source }
    }

    async fn context(&self, table: &TableRef) -> Result<SessionContext> {
        let dataset = self.source.load(&table.dataset_uri).await?;
        let batch = to_record_batch(&dataset)?;
        let provider = MemTable::try_new(batch.schema(), vec![vec![batch]])?;

        let ctx = SessionContext::new();
        ctx.register_table(table.table_name.as_str(), Arc::new(provider))?;
        Ok(ctx)
    }
}

#[async_trait]
impl QueryEngine for DataFusionQueryEngine {
    async fn execute(&self, table: &TableRef, sql: &str) -> Result<u64> {
        let ctx = self.context(table).await?;
        log::debug!("Executing against {}: {}", table.table_name, sql);
        let rows = ctx.sql(sql).await?.count().await?;
        Ok(rows as u64)
    }

    async fn describe_schema(&self, table: &TableRef) -> Result<Vec<(String, String)>> {
        let ctx = self.context(table).await?;
        let df = ctx.table(table.table_name.as_str()).await?;
        Ok(df
            .schema()
            .fields()
            .iter()
            .map(|f| (f.name().clone(), f.data_type().to_string()))
            .collect())
    }
}

fn arrow_type(kind: ColumnKind) -> DataType {
    match kind {
        ColumnKind::Numeric => DataType::Float64,
        ColumnKind::Boolean => DataType::Boolean,
        // Datetimes stay as their validated text form
        ColumnKind::Categorical | ColumnKind::Datetime => DataType::Utf8,
    }
}

/// Convert a dataset into a single Arrow record batch
pub fn to_record_batch(dataset: &Dataset) -> Result<RecordBatch> {
    let fields: Vec<Field> = dataset
        .columns
        .iter()
        .map(|c| Field::new(&c.name, arrow_type(c.kind), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let arrays: Vec<ArrayRef> = dataset
        .columns
        .iter()
        .map(|column| -> ArrayRef {
            match column.kind {
                ColumnKind::Numeric => Arc::new(
                    column
                        .values
                        .iter()
                        .map(Cell::as_f64)
                        .collect::<Float64Array>(),
                ),
                ColumnKind::Boolean => Arc::new(
                    column
                        .values
                        .iter()
                        .map(|c| match c {
                            Cell::Bool(b) => Some(*b),
                            _ => None,
                        })
                        .collect::<BooleanArray>(),
                ),
                ColumnKind::Categorical | ColumnKind::Datetime => Arc::new(
                    column
                        .values
                        .iter()
                        .map(|c| (!c.is_null()).then(|| c.to_string()))
                        .collect::<StringArray>(),
                ),
            }
        })
        .collect();

    if arrays.is_empty() {
        return Err(GovernorError::input("dataset has no columns"));
    }
    Ok(RecordBatch::try_new(schema, arrays)?)
}
