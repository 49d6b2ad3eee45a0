// src/transform/mod.rs
//
// Per-line CSV → `ValidatedRecord` conversion. Everything here is a pure
// function of the input line; the only side effect is the `warn!` emitted by
// `transform_line` when a row is dropped.

pub mod coerce;
pub mod record;

pub use coerce::CoerceError;
pub use record::{ValidatedRecord, RECORD_ARITY};

use csv::ReaderBuilder;
use tracing::warn;

/// Why a line did not produce a record.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("csv parse error: {source} for line {line:?}")]
    Csv { line: String, source: csv::Error },

    #[error("row too short ({} of {} columns): {row:?}", .row.len(), RECORD_ARITY)]
    TooShort { row: Vec<String> },

    #[error("column {column} in row {row:?}: {source}")]
    Coercion {
        row: Vec<String>,
        column: &'static str,
        source: CoerceError,
    },
}

/// Split one CSV line into its fields using standard quoting rules.
fn split_fields(line: &str) -> Result<Vec<String>, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(rec) => Ok(rec?.iter().map(str::to_string).collect()),
        None => Ok(Vec::new()),
    }
}

/// Parse and coerce one line.
///
/// - `Ok(None)`: blank line, nothing to load and nothing to report.
/// - `Ok(Some(_))`: a fully coerced record.
/// - `Err(_)`: the row is dropped; the error carries what a diagnostic needs.
pub fn parse_line(line: &str) -> Result<Option<ValidatedRecord>, RowError> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let row = split_fields(line).map_err(|source| RowError::Csv {
        line: line.to_string(),
        source,
    })?;

    if row.len() < RECORD_ARITY {
        return Err(RowError::TooShort { row });
    }

    coerce_row(&row)
        .map(Some)
        .map_err(|(column, source)| RowError::Coercion {
            row,
            column,
            source,
        })
}

/// Coerce an already split row of at least `RECORD_ARITY` fields.
fn coerce_row(row: &[String]) -> Result<ValidatedRecord, (&'static str, CoerceError)> {
    let int = |idx: usize, column: &'static str| {
        coerce::opt_int(&row[idx]).map_err(|e| (column, e))
    };
    let float = |idx: usize, column: &'static str| {
        coerce::opt_float(&row[idx]).map_err(|e| (column, e))
    };

    Ok(ValidatedRecord {
        year: int(0, "year")?,
        tour_no: int(1, "tour_no")?,
        winner: coerce::text(row, 2),
        country: coerce::text(row, 3),
        team: coerce::text(row, 4),
        tour_overall_length_km: float(5, "tour_overall_length_km")?,
        age: int(6, "age")?,
        bmi: float(7, "bmi")?,
        weight_kg: float(8, "weight_kg")?,
        height_m: float(9, "height_m")?,
        rider_type: coerce::text(row, 10),
        close_rider_type: coerce::text(row, 11),
    })
}

/// Turn one raw CSV line into zero or one record, logging any dropped row.
pub fn transform_line(line: &str) -> Option<ValidatedRecord> {
    match parse_line(line) {
        Ok(rec) => rec,
        Err(RowError::Csv { line, source }) => {
            warn!(%line, error = %source, "csv parse error, line dropped");
            None
        }
        Err(RowError::TooShort { row }) => {
            warn!(columns = row.len(), ?row, "row too short, ignored");
            None
        }
        Err(RowError::Coercion {
            row,
            column,
            source,
        }) => {
            warn!(?row, column, error = %source, "row coercion error, row dropped");
            None
        }
    }
}
