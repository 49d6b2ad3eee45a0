// src/warehouse/mod.rs
//
// The destination warehouse, reduced to the five calls the loader needs.
// Two backends: BigQuery over its REST API, and a local directory of Parquet
// files.

pub mod bigquery;
pub mod error;
pub mod local;

pub use bigquery::BigQueryClient;
pub use error::{WarehouseError, WarehouseResult};
pub use local::LocalWarehouse;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::TableSchema;
use crate::transform::ValidatedRecord;

static ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_]{1,1024}$").expect("identifier pattern should be valid")
});

fn check_project(project: &str) -> WarehouseResult<()> {
    if project.is_empty()
        || project == "."
        || project == ".."
        || project.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\')
    {
        return Err(WarehouseError::InvalidName(format!(
            "project id {:?}",
            project
        )));
    }
    Ok(())
}

fn check_id(kind: &str, id: &str) -> WarehouseResult<()> {
    if !ID_RE.is_match(id) {
        return Err(WarehouseError::InvalidName(format!("{} id {:?}", kind, id)));
    }
    Ok(())
}

/// Fully qualified dataset identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
    pub project: String,
    pub dataset: String,
}

impl DatasetRef {
    pub fn new(project: &str, dataset: &str) -> WarehouseResult<Self> {
        check_project(project)?;
        check_id("dataset", dataset)?;
        Ok(Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
        })
    }

    pub fn table(&self, table: &str) -> WarehouseResult<TableRef> {
        check_id("table", table)?;
        Ok(TableRef {
            dataset: self.clone(),
            table: table.to_string(),
        })
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.project, self.dataset)
    }
}

/// Fully qualified table identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset: DatasetRef,
    pub table: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// What a dataset lookup or creation reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    #[serde(flatten)]
    pub dataset: DatasetRef,
    pub location: Option<String>,
}

/// Create/lookup/append surface of a warehouse.
///
/// Lookups must report absence as [`WarehouseError::NotFound`] and creations
/// of something that exists as [`WarehouseError::AlreadyExists`]; every other
/// error is treated as fatal by callers.
#[allow(async_fn_in_trait)]
pub trait Warehouse {
    async fn get_dataset(&self, dataset: &DatasetRef) -> WarehouseResult<DatasetInfo>;

    async fn create_dataset(
        &self,
        dataset: &DatasetRef,
        location: &str,
    ) -> WarehouseResult<DatasetInfo>;

    async fn get_table(&self, table: &TableRef) -> WarehouseResult<TableSchema>;

    async fn create_table(&self, table: &TableRef, schema: &TableSchema) -> WarehouseResult<()>;

    /// Append `rows` to an existing table. Returns the number of rows written.
    async fn append_rows(&self, table: &TableRef, rows: &[ValidatedRecord])
        -> WarehouseResult<usize>;
}
