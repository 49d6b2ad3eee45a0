// src/pipeline.rs

use anyhow::{Context, Result};
use rayon::prelude::*;
use reqwest::Client;
use std::time::Instant;
use tracing::{info, instrument};

use crate::{
    config::Config,
    load::{append_records, ensure_table},
    provision::ensure_dataset,
    schema::winners_schema,
    source::{data_lines, fetch_text, InputLocation},
    transform::{transform_line, ValidatedRecord},
    warehouse::{DatasetRef, Warehouse},
};

/// What one run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    /// Data lines after the header, blank ones included.
    pub lines_read: usize,
    pub blank_lines: usize,
    pub records_loaded: usize,
    /// Non-blank lines that produced no record.
    pub rows_dropped: usize,
}

/// Output of the transform stage.
#[derive(Debug, Default)]
pub struct Transformed {
    pub records: Vec<ValidatedRecord>,
    pub lines_read: usize,
    pub blank_lines: usize,
}

/// Run `transform_line` over every line on a rayon pool of `workers` threads
/// (0 = rayon's default). Records come back in input order.
pub fn transform_lines(lines: &[&str], workers: usize) -> Result<Transformed> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("transform-{}", i))
        .build()
        .context("building transform thread pool")?;

    let (records, blank_lines) = pool.install(|| {
        let records: Vec<ValidatedRecord> =
            lines.par_iter().filter_map(|l| transform_line(l)).collect();
        let blank = lines.par_iter().filter(|l| l.trim().is_empty()).count();
        (records, blank)
    });

    Ok(Transformed {
        records,
        lines_read: lines.len(),
        blank_lines,
    })
}

/// Provision, read, transform and append. One full run of the job.
#[instrument(level = "info", skip_all, fields(project = %config.project_id, table = %config.table_name))]
pub async fn run<W: Warehouse>(config: &Config, warehouse: &W, http: &Client) -> Result<LoadSummary> {
    let start = Instant::now();

    let dataset = DatasetRef::new(&config.project_id, &config.dataset_name)?;
    let table = dataset.table(&config.table_name)?;

    // 1) dataset must exist before anything is loaded
    ensure_dataset(warehouse, &dataset, &config.dataset_location).await?;

    // 2) fetch the input
    let location = InputLocation::parse(&config.input)?;
    let text = fetch_text(&location, http, config.access_token.as_deref()).await?;

    // 3) parallel transform, off the async runtime
    let workers = config.worker_threads;
    let transformed = tokio::task::spawn_blocking(move || {
        let lines: Vec<&str> = data_lines(&text).collect();
        transform_lines(&lines, workers)
    })
    .await
    .context("transform task panicked")??;
    info!(
        lines = transformed.lines_read,
        records = transformed.records.len(),
        "transform done"
    );

    // 4) create-if-needed, then append
    ensure_table(warehouse, &table, winners_schema()).await?;
    let loaded = append_records(
        warehouse,
        &table,
        &transformed.records,
        config.load_batch_size,
    )
    .await?;

    let summary = LoadSummary {
        lines_read: transformed.lines_read,
        blank_lines: transformed.blank_lines,
        records_loaded: loaded,
        rows_dropped: transformed.lines_read - transformed.blank_lines - transformed.records.len(),
    };
    info!(?summary, elapsed = ?start.elapsed(), "load finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::warehouse::LocalWarehouse;
    use std::fs;
    use tempfile::tempdir;
    use tracing_subscriber::{fmt, EnvFilter};

    fn init_logging() {
        let _ = fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_test_writer()
            .try_init();
    }

    const CSV: &str = "Year,TourNo,Winner,Country,Team,TourOverallLengthKm,Age,BMI,WeightKg,HeightM,RiderType,CloseRiderType
1903,1,Maurice Garin,FRA,La Française,2428,32,,,,All Rounder,
2023,110,\"Pogačar, T.\",SLO,UAE,3405.0,24,21.5,66,1.76,Climber,Puncheur
2023,110

abc,110,W,SLO,UAE,3405.0,24,21.5,66,1.76,Climber,Puncheur
,,,,,,,,,,,
";

    fn local_config(root: &std::path::Path, input: &std::path::Path) -> Config {
        Config {
            project_id: "tourdefrance-bigdata".into(),
            dataset_name: "tdf_data".into(),
            table_name: "winners".into(),
            dataset_location: "EU".into(),
            input: input.display().to_string(),
            backend: Backend::Local {
                root: root.to_path_buf(),
            },
            access_token: None,
            load_batch_size: 2,
            worker_threads: 2,
        }
    }

    #[test]
    fn test_transform_lines_keeps_order() {
        let lines: Vec<&str> = data_lines(CSV).collect();
        let out = transform_lines(&lines, 3).unwrap();
        assert_eq!(out.lines_read, 6);
        assert_eq!(out.blank_lines, 1);
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.records[0].year, Some(1903));
        assert_eq!(out.records[1].winner, "Pogačar, T.");
        assert_eq!(out.records[2].year, None);
    }

    #[tokio::test]
    async fn test_run_end_to_end_local() {
        init_logging();
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("tdf_winners.csv");
        fs::write(&input, CSV).unwrap();
        let root = tmp.path().join("warehouse");
        let wh = LocalWarehouse::new(&root).unwrap();
        let cfg = local_config(&root, &input);

        let summary = run(&cfg, &wh, &Client::new()).await.unwrap();
        assert_eq!(
            summary,
            LoadSummary {
                lines_read: 6,
                blank_lines: 1,
                records_loaded: 3,
                rows_dropped: 2,
            }
        );

        let table = DatasetRef::new("tourdefrance-bigdata", "tdf_data")
            .unwrap()
            .table("winners")
            .unwrap();
        let rows = wh.read_records(&table).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].tour_overall_length_km, Some(3405.0));

        // a second run appends the same rows again
        let again = run(&cfg, &wh, &Client::new()).await.unwrap();
        assert_eq!(again.records_loaded, 3);
        assert_eq!(wh.read_records(&table).unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_run_header_only() {
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("empty.csv");
        fs::write(&input, "Year,TourNo\n").unwrap();
        let root = tmp.path().join("warehouse");
        let wh = LocalWarehouse::new(&root).unwrap();

        let summary = run(&local_config(&root, &input), &wh, &Client::new())
            .await
            .unwrap();
        assert_eq!(summary, LoadSummary::default());
    }

    #[tokio::test]
    async fn test_run_missing_input_fails_after_provisioning() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("warehouse");
        let wh = LocalWarehouse::new(&root).unwrap();
        let cfg = local_config(&root, &tmp.path().join("nope.csv"));

        assert!(run(&cfg, &wh, &Client::new()).await.is_err());
        let ds = DatasetRef::new("tourdefrance-bigdata", "tdf_data").unwrap();
        assert!(wh.get_dataset(&ds).await.is_ok());
    }
}
