use anyhow::{Context, Result};
use reqwest::Client;
use tdfload::{
    config::{Backend, Config},
    pipeline,
    warehouse::{BigQueryClient, LocalWarehouse},
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) .env + logging ───────────────────────────────────────────
    let _ = dotenvy::dotenv();
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tdfload=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) configuration, fail fast ─────────────────────────────────
    let config = Config::from_env().context("loading configuration")?;
    info!(
        project = %config.project_id,
        dataset = %config.dataset_name,
        table = %config.table_name,
        location = %config.dataset_location,
        input = %config.input,
        "startup"
    );

    // ─── 3) run against the configured warehouse ─────────────────────
    let http = Client::new();
    let summary = match &config.backend {
        Backend::BigQuery { endpoint } => {
            let token = config
                .access_token
                .clone()
                .context("GOOGLE_OAUTH_ACCESS_TOKEN is required for bigquery")?;
            let warehouse = BigQueryClient::new(http.clone(), endpoint.clone(), token);
            pipeline::run(&config, &warehouse, &http).await?
        }
        Backend::Local { root } => {
            let warehouse = LocalWarehouse::new(root)
                .with_context(|| format!("opening local warehouse {}", root.display()))?;
            pipeline::run(&config, &warehouse, &http).await?
        }
    };

    info!(
        loaded = summary.records_loaded,
        dropped = summary.rows_dropped,
        "all done"
    );
    Ok(())
}
