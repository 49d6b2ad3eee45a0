// src/warehouse/bigquery.rs

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::{
    DatasetInfo, DatasetRef, TableRef, Warehouse, WarehouseError, WarehouseResult,
};
use crate::schema::TableSchema;
use crate::transform::ValidatedRecord;

pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2/";

/// BigQuery REST v2 client authenticated with a bearer access token.
#[derive(Clone)]
pub struct BigQueryClient {
    http: Client,
    base: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    project_id: String,
    dataset_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetResource {
    dataset_reference: DatasetReference,
    location: Option<String>,
}

impl From<DatasetResource> for DatasetInfo {
    fn from(r: DatasetResource) -> Self {
        DatasetInfo {
            dataset: DatasetRef {
                project: r.dataset_reference.project_id,
                dataset: r.dataset_reference.dataset_id,
            },
            location: r.location,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TableResource {
    schema: Option<TableSchema>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsertErrors {
    #[serde(default)]
    index: u64,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertErrors>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ErrorProto,
}

/// Pull the human message out of a Google API error body, else the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Classify a non-success response. `what` names the resource involved.
fn classify(status: StatusCode, url: &str, what: &str, body: &str) -> WarehouseError {
    let message = error_message(body);
    match status {
        StatusCode::NOT_FOUND => WarehouseError::NotFound(what.to_string()),
        StatusCode::CONFLICT => WarehouseError::AlreadyExists(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            WarehouseError::PermissionDenied(format!("{}: {}", what, message))
        }
        _ => WarehouseError::Api {
            url: url.to_string(),
            status: status.as_u16(),
            message,
        },
    }
}

fn dataset_body(dataset: &DatasetRef, location: &str) -> Value {
    json!({
        "datasetReference": {
            "projectId": dataset.project,
            "datasetId": dataset.dataset,
        },
        "location": location,
    })
}

fn table_body(table: &TableRef, schema: &TableSchema) -> Value {
    json!({
        "tableReference": {
            "projectId": table.dataset.project,
            "datasetId": table.dataset.dataset,
            "tableId": table.table,
        },
        "schema": schema,
    })
}

fn insert_all_body(rows: &[ValidatedRecord]) -> Value {
    let rows: Vec<Value> = rows.iter().map(|r| json!({ "json": r })).collect();
    json!({
        "kind": "bigquery#tableDataInsertAllRequest",
        "rows": rows,
    })
}

/// Summarise `insertErrors` into one line, or `None` when every row landed.
fn rejected_rows(resp: &InsertAllResponse) -> Option<(usize, String)> {
    if resp.insert_errors.is_empty() {
        return None;
    }
    let detail = resp
        .insert_errors
        .iter()
        .take(5)
        .map(|ie| {
            let reasons: Vec<String> = ie
                .errors
                .iter()
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.reason.as_deref().unwrap_or("unknown"),
                        e.message.as_deref().unwrap_or("")
                    )
                })
                .collect();
            format!("row {} [{}]", ie.index, reasons.join("; "))
        })
        .collect::<Vec<_>>()
        .join(", ");
    Some((resp.insert_errors.len(), detail))
}

impl BigQueryClient {
    pub fn new(http: Client, base: Url, token: impl Into<String>) -> Self {
        Self {
            http,
            base,
            token: token.into(),
        }
    }

    /// `base` + percent-encoded path segments.
    fn url(&self, segments: &[&str]) -> WarehouseResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                WarehouseError::Other(anyhow::anyhow!(
                    "endpoint {} cannot be used as a base URL",
                    self.base
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn datasets_url(&self, project: &str) -> WarehouseResult<Url> {
        self.url(&["projects", project, "datasets"])
    }

    fn tables_url(&self, ds: &DatasetRef) -> WarehouseResult<Url> {
        self.url(&[
            "projects",
            ds.project.as_str(),
            "datasets",
            ds.dataset.as_str(),
            "tables",
        ])
    }

    fn table_url(&self, table: &TableRef, method: Option<&str>) -> WarehouseResult<Url> {
        let ds = &table.dataset;
        let mut segs = vec![
            "projects",
            ds.project.as_str(),
            "datasets",
            ds.dataset.as_str(),
            "tables",
            table.table.as_str(),
        ];
        segs.extend(method);
        self.url(&segs)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        what: &str,
    ) -> WarehouseResult<T> {
        let resp = req.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        let url = resp.url().to_string();
        debug!(%url, %status, "bigquery response");
        if status.is_success() {
            Ok(resp.json::<T>().await?)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(classify(status, &url, what, &body))
        }
    }
}

impl Warehouse for BigQueryClient {
    async fn get_dataset(&self, dataset: &DatasetRef) -> WarehouseResult<DatasetInfo> {
        let url = self.url(&[
            "projects",
            dataset.project.as_str(),
            "datasets",
            dataset.dataset.as_str(),
        ])?;
        let res: DatasetResource = self
            .send(self.http.get(url), &dataset.to_string())
            .await?;
        Ok(res.into())
    }

    async fn create_dataset(
        &self,
        dataset: &DatasetRef,
        location: &str,
    ) -> WarehouseResult<DatasetInfo> {
        let url = self.datasets_url(&dataset.project)?;
        let req = self.http.post(url).json(&dataset_body(dataset, location));
        let res: DatasetResource = self.send(req, &dataset.to_string()).await?;
        Ok(res.into())
    }

    async fn get_table(&self, table: &TableRef) -> WarehouseResult<TableSchema> {
        let url = self.table_url(table, None)?;
        let res: TableResource = self.send(self.http.get(url), &table.to_string()).await?;
        Ok(res.schema.unwrap_or_default())
    }

    async fn create_table(&self, table: &TableRef, schema: &TableSchema) -> WarehouseResult<()> {
        let url = self.tables_url(&table.dataset)?;
        let req = self.http.post(url).json(&table_body(table, schema));
        let _: Value = self.send(req, &table.to_string()).await?;
        Ok(())
    }

    async fn append_rows(
        &self,
        table: &TableRef,
        rows: &[ValidatedRecord],
    ) -> WarehouseResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let url = self.table_url(table, Some("insertAll"))?;
        let req = self.http.post(url).json(&insert_all_body(rows));
        let resp: InsertAllResponse = self.send(req, &table.to_string()).await?;

        if let Some((count, message)) = rejected_rows(&resp) {
            return Err(WarehouseError::RowsRejected {
                table: table.to_string(),
                count,
                message,
            });
        }
        Ok(rows.len())
    }
}
