// src/transform/coerce.rs

use std::num::{ParseFloatError, ParseIntError};

/// Why a non-blank cell could not be coerced into its column type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoerceError {
    #[error("invalid integer {value:?}: {source}")]
    Int {
        value: String,
        source: ParseIntError,
    },
    #[error("invalid float {value:?}: {source}")]
    Float {
        value: String,
        source: ParseFloatError,
    },
    #[error("non-finite float {value:?}")]
    NonFinite { value: String },
}

/// Blank → `None`, otherwise a base-10 integer.
pub fn opt_int(raw: &str) -> Result<Option<i64>, CoerceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<i64>()
        .map(Some)
        .map_err(|source| CoerceError::Int {
            value: trimmed.to_string(),
            source,
        })
}

/// Blank → `None`, otherwise a finite `f64`.
pub fn opt_float(raw: &str) -> Result<Option<f64>, CoerceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let v = trimmed
        .parse::<f64>()
        .map_err(|source| CoerceError::Float {
            value: trimmed.to_string(),
            source,
        })?;
    if !v.is_finite() {
        return Err(CoerceError::NonFinite {
            value: trimmed.to_string(),
        });
    }
    Ok(Some(v))
}

/// Trimmed text of column `idx`, or `""` when the row is too short for it.
pub fn text(row: &[String], idx: usize) -> String {
    row.get(idx).map(|s| s.trim().to_string()).unwrap_or_default()
}
