// src/load.rs
//
// Create-if-missing + append-only load of validated records.

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::schema::TableSchema;
use crate::transform::ValidatedRecord;
use crate::warehouse::{TableRef, Warehouse};

/// Outcome of [`ensure_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Existing,
    Created,
}

/// Create `table` with `schema` unless it already exists.
///
/// An existing table must carry the same column names and types (modes may
/// differ); anything else is an error since this job never alters a table.
pub async fn ensure_table<W: Warehouse>(
    warehouse: &W,
    table: &TableRef,
    schema: &TableSchema,
) -> Result<TableStatus> {
    match warehouse.get_table(table).await {
        Ok(existing) => {
            if !existing.same_columns(schema) {
                bail!(
                    "table {} exists with columns {:?}, expected {:?}",
                    table,
                    existing.describe(),
                    schema.describe()
                );
            }
            info!(table = %table, "table already exists");
            Ok(TableStatus::Existing)
        }
        Err(e) if e.is_not_found() => match warehouse.create_table(table, schema).await {
            Ok(()) => {
                info!(table = %table, columns = schema.fields.len(), "table created");
                Ok(TableStatus::Created)
            }
            Err(e) if e.is_already_exists() => Ok(TableStatus::Existing),
            Err(e) => Err(e).with_context(|| format!("creating table {}", table)),
        },
        Err(e) => Err(e).with_context(|| format!("looking up table {}", table)),
    }
}

/// Append `records` to `table` in batches of `batch_size`. Returns rows written.
pub async fn append_records<W: Warehouse>(
    warehouse: &W,
    table: &TableRef,
    records: &[ValidatedRecord],
    batch_size: usize,
) -> Result<usize> {
    let mut written = 0;
    for (i, chunk) in records.chunks(batch_size.max(1)).enumerate() {
        let n = warehouse
            .append_rows(table, chunk)
            .await
            .with_context(|| format!("appending batch {} to {}", i, table))?;
        debug!(batch = i, rows = n, "appended batch");
        written += n;
    }
    info!(table = %table, rows = written, "append complete");
    Ok(written)
}
