// src/warehouse/local.rs

use chrono::{DateTime, Utc};
use glob::glob;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{self, Cursor},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::fs;
use tracing::debug;

use super::{
    DatasetInfo, DatasetRef, TableRef, Warehouse, WarehouseError, WarehouseResult,
};
use crate::schema::{batch_to_records, build_arrow_schema, records_to_batch, winners_schema, TableSchema};
use crate::transform::ValidatedRecord;

const DATASET_META: &str = "dataset.json";
const TABLE_SCHEMA: &str = "_schema.json";

/// On-disk `dataset.json`.
#[derive(Debug, Serialize, Deserialize)]
struct DatasetMeta {
    #[serde(flatten)]
    info: DatasetInfo,
    created_at: DateTime<Utc>,
}

/// A warehouse rooted at a local directory.
///
/// Layout:
/// ```text
/// <root>/<project>/<dataset>/dataset.json
/// <root>/<project>/<dataset>/<table>/_schema.json
/// <root>/<project>/<dataset>/<table>/part-<micros>-<seq>.parquet
/// ```
/// Every append writes a new part file; existing parts are never rewritten.
#[derive(Debug)]
pub struct LocalWarehouse {
    root: PathBuf,
    seq: AtomicU64,
}

/// Map an io error onto the warehouse's typed existence errors.
fn io_err(e: io::Error, what: String) -> WarehouseError {
    match e.kind() {
        io::ErrorKind::NotFound => WarehouseError::NotFound(what),
        io::ErrorKind::AlreadyExists => WarehouseError::AlreadyExists(what),
        io::ErrorKind::PermissionDenied => {
            WarehouseError::PermissionDenied(format!("{}: {}", what, e))
        }
        _ => WarehouseError::Io(e),
    }
}

/// Write `data` to a hidden tmp file next to `path`, then rename over it.
async fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("out");
    let tmp = path.with_file_name(format!(".{}.tmp", name));
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await
}

fn write_parquet_to_memory(rows: &[ValidatedRecord]) -> WarehouseResult<Vec<u8>> {
    let batch = records_to_batch(rows)?;
    let mut buffer = Vec::new();
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(
        Cursor::new(&mut buffer),
        build_arrow_schema(winners_schema())?,
        Some(props),
    )?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buffer)
}

impl LocalWarehouse {
    /// Open (and create if needed) a warehouse rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> WarehouseResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            seq: AtomicU64::new(0),
        })
    }

    /// Open an existing warehouse without creating anything.
    pub fn open(root: impl Into<PathBuf>) -> WarehouseResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(WarehouseError::NotFound(root.display().to_string()));
        }
        Ok(Self {
            root,
            seq: AtomicU64::new(0),
        })
    }

    fn dataset_dir(&self, ds: &DatasetRef) -> PathBuf {
        self.root.join(&ds.project).join(&ds.dataset)
    }

    fn table_dir(&self, table: &TableRef) -> PathBuf {
        self.dataset_dir(&table.dataset).join(&table.table)
    }

    /// Part files of `table`, oldest first.
    pub fn list_parts(&self, table: &TableRef) -> WarehouseResult<Vec<PathBuf>> {
        let dir = self.table_dir(table);
        if !dir.is_dir() {
            return Err(WarehouseError::NotFound(table.to_string()));
        }
        let pattern = format!(
            "{}/part-*.parquet",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let mut parts: Vec<PathBuf> = glob(&pattern)
            .map_err(|e| WarehouseError::Other(e.into()))?
            .filter_map(Result::ok)
            .collect();
        parts.sort();
        Ok(parts)
    }

    /// Read every row of `table` back, in append order.
    pub fn read_records(&self, table: &TableRef) -> WarehouseResult<Vec<ValidatedRecord>> {
        let mut out = Vec::new();
        for part in self.list_parts(table)? {
            let file = File::open(&part)?;
            let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
            for batch in reader {
                out.extend(batch_to_records(&batch?)?);
            }
        }
        Ok(out)
    }

    fn next_part_name(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!(
            "part-{:020}-{:06}.parquet",
            Utc::now().timestamp_micros(),
            seq
        )
    }
}

impl Warehouse for LocalWarehouse {
    async fn get_dataset(&self, dataset: &DatasetRef) -> WarehouseResult<DatasetInfo> {
        let path = self.dataset_dir(dataset).join(DATASET_META);
        let raw = fs::read(&path)
            .await
            .map_err(|e| io_err(e, dataset.to_string()))?;
        let meta: DatasetMeta = serde_json::from_slice(&raw)?;
        Ok(meta.info)
    }

    async fn create_dataset(
        &self,
        dataset: &DatasetRef,
        location: &str,
    ) -> WarehouseResult<DatasetInfo> {
        // A dataset exists once its dataset.json does; a bare directory left
        // by an interrupted create is reused.
        let dir = self.dataset_dir(dataset);
        fs::create_dir_all(&dir).await?;

        let meta = DatasetMeta {
            info: DatasetInfo {
                dataset: dataset.clone(),
                location: Some(location.to_string()),
            },
            created_at: Utc::now(),
        };
        let mut json = serde_json::to_vec_pretty(&meta)?;
        json.push(b'\n');

        // hard_link fails with AlreadyExists if another creator got there first
        let tmp = dir.join(format!(
            ".{}.{}-{}.tmp",
            DATASET_META,
            std::process::id(),
            self.seq.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, &json).await?;
        let linked = fs::hard_link(&tmp, dir.join(DATASET_META)).await;
        fs::remove_file(&tmp).await?;
        linked.map_err(|e| io_err(e, dataset.to_string()))?;
        debug!(dir = %dir.display(), "wrote dataset metadata");
        Ok(meta.info)
    }

    async fn get_table(&self, table: &TableRef) -> WarehouseResult<TableSchema> {
        let path = self.table_dir(table).join(TABLE_SCHEMA);
        let raw = fs::read(&path)
            .await
            .map_err(|e| io_err(e, table.to_string()))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn create_table(&self, table: &TableRef, schema: &TableSchema) -> WarehouseResult<()> {
        let ds_meta = self.dataset_dir(&table.dataset).join(DATASET_META);
        if fs::metadata(&ds_meta).await.is_err() {
            return Err(WarehouseError::NotFound(table.dataset.to_string()));
        }

        let dir = self.table_dir(table);
        fs::create_dir(&dir)
            .await
            .map_err(|e| io_err(e, table.to_string()))?;

        let mut json = serde_json::to_vec_pretty(schema)?;
        json.push(b'\n');
        write_atomic(&dir.join(TABLE_SCHEMA), &json).await?;
        Ok(())
    }

    async fn append_rows(
        &self,
        table: &TableRef,
        rows: &[ValidatedRecord],
    ) -> WarehouseResult<usize> {
        let stored = self.get_table(table).await?;
        if !stored.same_columns(winners_schema()) {
            return Err(WarehouseError::SchemaMismatch {
                table: table.to_string(),
                message: format!("stored columns {:?}", stored.describe()),
            });
        }
        if rows.is_empty() {
            return Ok(0);
        }

        let data = write_parquet_to_memory(rows)?;
        let path = self.table_dir(table).join(self.next_part_name());
        write_atomic(&path, &data).await?;
        debug!(
            part = %path.display(),
            rows = rows.len(),
            bytes = data.len(),
            "wrote part"
        );
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldMode, FieldType, TableField};
    use crate::transform::transform_line;
    use tempfile::tempdir;

    fn refs() -> (DatasetRef, TableRef) {
        let ds = DatasetRef::new("tourdefrance-bigdata", "tdf_data").unwrap();
        let t = ds.table("winners").unwrap();
        (ds, t)
    }

    #[tokio::test]
    async fn test_dataset_lifecycle() {
        let tmp = tempdir().unwrap();
        let wh = LocalWarehouse::new(tmp.path()).unwrap();
        let (ds, _) = refs();

        assert!(wh.get_dataset(&ds).await.unwrap_err().is_not_found());

        let info = wh.create_dataset(&ds, "EU").await.unwrap();
        assert_eq!(info.location.as_deref(), Some("EU"));
        assert_eq!(wh.get_dataset(&ds).await.unwrap(), info);

        let again = wh.create_dataset(&ds, "EU").await.unwrap_err();
        assert!(again.is_already_exists());
    }

    #[tokio::test]
    async fn test_table_requires_dataset() {
        let tmp = tempdir().unwrap();
        let wh = LocalWarehouse::new(tmp.path()).unwrap();
        let (_, t) = refs();

        let err = wh.create_table(&t, winners_schema()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(wh.get_table(&t).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_appends_accumulate() {
        let tmp = tempdir().unwrap();
        let wh = LocalWarehouse::new(tmp.path()).unwrap();
        let (ds, t) = refs();
        wh.create_dataset(&ds, "EU").await.unwrap();
        wh.create_table(&t, winners_schema()).await.unwrap();
        assert_eq!(&wh.get_table(&t).await.unwrap(), winners_schema());
        assert!(wh
            .create_table(&t, winners_schema())
            .await
            .unwrap_err()
            .is_already_exists());

        let first = vec![
            transform_line("1903,1,Maurice Garin,FRA,La Française,2428,32,,,,,").unwrap(),
            transform_line("1904,2,Henri Cornet,FRA,Conte,2428,19,,,,,").unwrap(),
        ];
        let second =
            vec![transform_line("2023,110,Tadej Pogačar,SLO,UAE,3405,24,21.5,66,1.76,,").unwrap()];

        assert_eq!(wh.append_rows(&t, &first).await.unwrap(), 2);
        assert_eq!(wh.append_rows(&t, &second).await.unwrap(), 1);
        assert_eq!(wh.append_rows(&t, &[]).await.unwrap(), 0);

        assert_eq!(wh.list_parts(&t).unwrap().len(), 2);
        let all = wh.read_records(&t).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], first[0]);
        assert_eq!(all[2], second[0]);
    }

    #[tokio::test]
    async fn test_append_rejects_foreign_schema() {
        let tmp = tempdir().unwrap();
        let wh = LocalWarehouse::new(tmp.path()).unwrap();
        let (ds, t) = refs();
        wh.create_dataset(&ds, "EU").await.unwrap();
        let other = TableSchema {
            fields: vec![TableField::nullable("year", FieldType::String)],
        };
        wh.create_table(&t, &other).await.unwrap();

        let rec = transform_line(",,,,,,,,,,,").unwrap();
        let err = wh.append_rows(&t, &[rec]).await.unwrap_err();
        assert!(matches!(err, WarehouseError::SchemaMismatch { .. }));
    }

    #[tokio::test]
    async fn test_append_ignores_column_modes() {
        let tmp = tempdir().unwrap();
        let wh = LocalWarehouse::new(tmp.path()).unwrap();
        let (ds, t) = refs();
        wh.create_dataset(&ds, "EU").await.unwrap();
        let mut strict = winners_schema().clone();
        strict.fields[0].mode = FieldMode::Required;
        wh.create_table(&t, &strict).await.unwrap();

        let rec = transform_line("1903,1,Maurice Garin,FRA,La Française,2428,32,,,,,").unwrap();
        assert_eq!(wh.append_rows(&t, &[rec.clone()]).await.unwrap(), 1);
        assert_eq!(wh.read_records(&t).unwrap(), vec![rec]);
    }

    #[tokio::test]
    async fn test_interrupted_dataset_create_is_not_found_then_completes() {
        let tmp = tempdir().unwrap();
        let wh = LocalWarehouse::new(tmp.path()).unwrap();
        let (ds, t) = refs();
        // directory without dataset.json
        std::fs::create_dir_all(tmp.path().join(&ds.project).join(&ds.dataset)).unwrap();

        assert!(wh.get_dataset(&ds).await.unwrap_err().is_not_found());
        let info = wh.create_dataset(&ds, "EU").await.unwrap();
        assert_eq!(wh.get_dataset(&ds).await.unwrap(), info);
        wh.create_table(&t, winners_schema()).await.unwrap();

        // no temp files left behind
        let names: Vec<String> = std::fs::read_dir(tmp.path().join(&ds.project).join(&ds.dataset))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{:?}", names);
    }

    #[test]
    fn test_open_requires_existing_root() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("typo");
        assert!(LocalWarehouse::open(&missing).unwrap_err().is_not_found());
        assert!(!missing.exists());
        assert!(LocalWarehouse::open(tmp.path()).is_ok());
    }

    #[tokio::test]
    async fn test_append_to_missing_table() {
        let tmp = tempdir().unwrap();
        let wh = LocalWarehouse::new(tmp.path()).unwrap();
        let (_, t) = refs();
        let rec = transform_line(",,,,,,,,,,,").unwrap();
        assert!(wh.append_rows(&t, &[rec]).await.unwrap_err().is_not_found());
    }
}
