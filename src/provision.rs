// src/provision.rs

use anyhow::{Context, Result};
use tracing::info;

use crate::warehouse::{DatasetRef, Warehouse};

/// Outcome of [`ensure_dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    AlreadyExists,
    Created,
}

/// Make sure `dataset` exists, creating it in `location` only when the lookup
/// reports it as not found.
///
/// Lookup failures other than not-found are returned as errors and never lead
/// to a create call. A create that races another creator and gets
/// "already exists" back counts as success.
pub async fn ensure_dataset<W: Warehouse>(
    warehouse: &W,
    dataset: &DatasetRef,
    location: &str,
) -> Result<Provisioned> {
    match warehouse.get_dataset(dataset).await {
        Ok(info) => {
            info!(
                dataset = %dataset,
                location = info.location.as_deref().unwrap_or("unknown"),
                "dataset already exists"
            );
            return Ok(Provisioned::AlreadyExists);
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            return Err(e).with_context(|| format!("looking up dataset {}", dataset));
        }
    }

    match warehouse.create_dataset(dataset, location).await {
        Ok(_) => {
            info!(dataset = %dataset, location, "dataset created");
            Ok(Provisioned::Created)
        }
        Err(e) if e.is_already_exists() => {
            info!(dataset = %dataset, "dataset already exists (created concurrently)");
            Ok(Provisioned::AlreadyExists)
        }
        Err(e) => Err(e).with_context(|| format!("creating dataset {} in {}", dataset, location)),
    }
}
