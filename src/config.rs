// src/config.rs
//
// Job settings, read once from the environment (a `.env` file is loaded by
// the binary first) and validated before anything else runs.

use once_cell::sync::Lazy;
use regex::Regex;
use std::{fmt, path::PathBuf};
use thiserror::Error;
use url::Url;

use crate::warehouse::bigquery::DEFAULT_ENDPOINT;

pub const DEFAULT_DATASET: &str = "tdf_data";
pub const DEFAULT_TABLE: &str = "winners";
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// `EU`, `US`, `europe-west1`, `us-central1`, ...
static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z]+(-[A-Za-z]+[0-9]+)?$").expect("location pattern should be valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Which warehouse the records go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    BigQuery { endpoint: Url },
    Local { root: PathBuf },
}

#[derive(Clone)]
pub struct Config {
    pub project_id: String,
    pub dataset_name: String,
    pub table_name: String,
    pub dataset_location: String,
    pub input: String,
    pub backend: Backend,
    pub access_token: Option<String>,
    pub load_batch_size: usize,
    pub worker_threads: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("project_id", &self.project_id)
            .field("dataset_name", &self.dataset_name)
            .field("table_name", &self.table_name)
            .field("dataset_location", &self.dataset_location)
            .field("input", &self.input)
            .field("backend", &self.backend)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("load_batch_size", &self.load_batch_size)
            .field("worker_threads", &self.worker_threads)
            .finish()
    }
}

/// Trimmed, non-empty value of `key`.
fn optional<F>(get: &F, key: &'static str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(get: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(get, key).ok_or(ConfigError::Missing(key))
}

fn number<F>(get: &F, key: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(get, key) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e| ConfigError::Invalid {
            key,
            message: format!("{:?}: {}", v, e),
        }),
    }
}

impl Config {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key → value lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_id = required(&get, "PROJECT_NAME")?;
        let dataset_location = required(&get, "DATASET_LOCATION")?;
        let input = required(&get, "CSV_TOREAD")?;
        let dataset_name =
            optional(&get, "DATASET_NAME").unwrap_or_else(|| DEFAULT_DATASET.to_string());
        let table_name = optional(&get, "TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE.to_string());
        let access_token = optional(&get, "GOOGLE_OAUTH_ACCESS_TOKEN");

        if !LOCATION_RE.is_match(&dataset_location) {
            return Err(ConfigError::Invalid {
                key: "DATASET_LOCATION",
                message: format!("{:?} is not a location code", dataset_location),
            });
        }

        let backend = match optional(&get, "WAREHOUSE")
            .unwrap_or_else(|| "bigquery".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "bigquery" => {
                let raw = optional(&get, "BIGQUERY_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
                let endpoint = Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    key: "BIGQUERY_ENDPOINT",
                    message: format!("{:?}: {}", raw, e),
                })?;
                if access_token.is_none() {
                    return Err(ConfigError::Missing("GOOGLE_OAUTH_ACCESS_TOKEN"));
                }
                Backend::BigQuery { endpoint }
            }
            "local" => Backend::Local {
                root: PathBuf::from(required(&get, "WAREHOUSE_DIR")?),
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "WAREHOUSE",
                    message: format!("{:?}, expected bigquery or local", other),
                })
            }
        };

        if input.starts_with("gs://") && access_token.is_none() {
            return Err(ConfigError::Missing("GOOGLE_OAUTH_ACCESS_TOKEN"));
        }

        let load_batch_size = number(&get, "LOAD_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if load_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "LOAD_BATCH_SIZE",
                message: "must be greater than zero".to_string(),
            });
        }
        let worker_threads = number(&get, "WORKER_THREADS", 0)?;

        Ok(Config {
            project_id,
            dataset_name,
            table_name,
            dataset_location,
            input,
            backend,
            access_token,
            load_batch_size,
            worker_threads,
        })
    }
}
