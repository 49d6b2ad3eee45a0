//! Warehouse error types.
//!
//! [`WarehouseError`] keeps "does not exist" and "already exists" apart from
//! every other failure so callers can decide create-if-absent without
//! mistaking a permission or network problem for absence.

use thiserror::Error;

/// Result alias for warehouse operations.
pub type WarehouseResult<T> = Result<T, WarehouseError>;

#[derive(Debug, Error)]
pub enum WarehouseError {
    /// A project, dataset or table identifier is malformed.
    #[error("invalid identifier: {0}")]
    InvalidName(String),

    /// The dataset or table does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A create call lost against an existing dataset or table.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Credentials were rejected or lack access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The stored table schema is not the one being written.
    #[error("schema mismatch for {table}: {message}")]
    SchemaMismatch { table: String, message: String },

    /// The warehouse refused some of the appended rows.
    #[error("{count} rows rejected by {table}: {message}")]
    RowsRejected {
        table: String,
        count: usize,
        message: String,
    },

    /// Any other non-success API response.
    #[error("request to {url} failed with status {status}: {message}")]
    Api {
        url: String,
        status: u16,
        message: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WarehouseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, WarehouseError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, WarehouseError::AlreadyExists(_))
    }
}
