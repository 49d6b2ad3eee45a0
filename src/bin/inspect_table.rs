//! Print a local-warehouse table: dataset metadata, schema, row count and the
//! first rows as JSON lines.

use anyhow::{Context, Result};
use std::{env, path::PathBuf, process::exit};
use tdfload::warehouse::{DatasetRef, LocalWarehouse, Warehouse};

const DEFAULT_LIMIT: usize = 10;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 5 || args.len() > 6 {
        eprintln!(
            "Usage: {} <WAREHOUSE_DIR> <PROJECT> <DATASET> <TABLE> [LIMIT]",
            args[0]
        );
        exit(1);
    }
    if let Err(e) = inspect(&args[1..]).await {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

async fn inspect(args: &[String]) -> Result<()> {
    let root = PathBuf::from(&args[0]);
    let limit: usize = match args.get(4) {
        Some(v) => v.parse().with_context(|| format!("bad LIMIT {:?}", v))?,
        None => DEFAULT_LIMIT,
    };

    let wh = LocalWarehouse::open(&root)
        .with_context(|| format!("opening warehouse {}", root.display()))?;
    let dataset = DatasetRef::new(&args[1], &args[2])?;
    let table = dataset.table(&args[3])?;

    let info = wh
        .get_dataset(&dataset)
        .await
        .with_context(|| format!("dataset {}", dataset))?;
    let schema = wh
        .get_table(&table)
        .await
        .with_context(|| format!("table {}", table))?;
    let parts = wh.list_parts(&table)?;
    let rows = wh.read_records(&table)?;

    println!("=== Table: {} ===", table);
    println!(
        "Location:     {}",
        info.location.as_deref().unwrap_or("<unknown>")
    );
    println!("Part files:   {}", parts.len());
    println!("Total rows:   {}", rows.len());
    println!();

    println!("=== Schema ===");
    for f in &schema.fields {
        println!("- {:<24} | {:<8} | {:?}", f.name, f.field_type, f.mode);
    }
    println!();

    println!("=== First {} rows ===", limit.min(rows.len()));
    for row in rows.iter().take(limit) {
        println!("{}", serde_json::to_string(row)?);
    }
    Ok(())
}
