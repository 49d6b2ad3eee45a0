// src/schema/arrow.rs

use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{
        Array, ArrayRef, Float64Array, Float64Builder, Int64Array, Int64Builder, StringArray,
        StringBuilder,
    },
    datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema},
    record_batch::RecordBatch,
};
use std::sync::Arc;

use super::types::{FieldMode, FieldType, TableSchema};
use super::winners_schema;
use crate::transform::ValidatedRecord;

/// Map a warehouse column type onto its Arrow DataType.
///
/// - INTEGER → Int64
/// - FLOAT   → Float64
/// - STRING  → Utf8
///
/// Any other warehouse type has no mapping here.
pub fn map_to_arrow_type(ty: &FieldType) -> Result<DataType> {
    match ty {
        FieldType::Integer => Ok(DataType::Int64),
        FieldType::Float => Ok(DataType::Float64),
        FieldType::String => Ok(DataType::Utf8),
        FieldType::Other(name) => Err(anyhow!("no arrow type for column type {}", name)),
    }
}

/// Build an ArrowSchema (inside an Arc) from a `TableSchema`.
pub fn build_arrow_schema(schema: &TableSchema) -> Result<Arc<ArrowSchema>> {
    let fields = schema
        .fields
        .iter()
        .map(|f| {
            let dt = map_to_arrow_type(&f.field_type)
                .with_context(|| format!("column {}", f.name))?;
            Ok(ArrowField::new(&f.name, dt, f.mode != FieldMode::Required))
        })
        .collect::<Result<Vec<ArrowField>>>()?;

    Ok(Arc::new(ArrowSchema::new(fields)))
}

/// Column-wise builders, one per winners field, in schema order.
#[derive(Default)]
struct WinnerBuilders {
    year: Int64Builder,
    tour_no: Int64Builder,
    winner: StringBuilder,
    country: StringBuilder,
    team: StringBuilder,
    tour_overall_length_km: Float64Builder,
    age: Int64Builder,
    bmi: Float64Builder,
    weight_kg: Float64Builder,
    height_m: Float64Builder,
    rider_type: StringBuilder,
    close_rider_type: StringBuilder,
}

impl WinnerBuilders {
    fn append(&mut self, r: &ValidatedRecord) {
        self.year.append_option(r.year);
        self.tour_no.append_option(r.tour_no);
        self.winner.append_value(&r.winner);
        self.country.append_value(&r.country);
        self.team.append_value(&r.team);
        self.tour_overall_length_km
            .append_option(r.tour_overall_length_km);
        self.age.append_option(r.age);
        self.bmi.append_option(r.bmi);
        self.weight_kg.append_option(r.weight_kg);
        self.height_m.append_option(r.height_m);
        self.rider_type.append_value(&r.rider_type);
        self.close_rider_type.append_value(&r.close_rider_type);
    }

    fn finish(mut self) -> Vec<ArrayRef> {
        vec![
            Arc::new(self.year.finish()),
            Arc::new(self.tour_no.finish()),
            Arc::new(self.winner.finish()),
            Arc::new(self.country.finish()),
            Arc::new(self.team.finish()),
            Arc::new(self.tour_overall_length_km.finish()),
            Arc::new(self.age.finish()),
            Arc::new(self.bmi.finish()),
            Arc::new(self.weight_kg.finish()),
            Arc::new(self.height_m.finish()),
            Arc::new(self.rider_type.finish()),
            Arc::new(self.close_rider_type.finish()),
        ]
    }
}

/// Pack records into a single RecordBatch with the winners schema.
pub fn records_to_batch(records: &[ValidatedRecord]) -> Result<RecordBatch> {
    let mut builders = WinnerBuilders::default();
    for r in records {
        builders.append(r);
    }
    let schema = build_arrow_schema(winners_schema())?;
    RecordBatch::try_new(schema, builders.finish()).context("building winners record batch")
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("missing column {}", name))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| anyhow!("column {} has unexpected type", name))
}

fn opt_i64(arr: &Int64Array, i: usize) -> Option<i64> {
    (!arr.is_null(i)).then(|| arr.value(i))
}

fn opt_f64(arr: &Float64Array, i: usize) -> Option<f64> {
    (!arr.is_null(i)).then(|| arr.value(i))
}

fn string(arr: &StringArray, i: usize) -> String {
    if arr.is_null(i) {
        String::new()
    } else {
        arr.value(i).to_string()
    }
}

/// Unpack a winners RecordBatch back into records.
pub fn batch_to_records(batch: &RecordBatch) -> Result<Vec<ValidatedRecord>> {
    let year = column::<Int64Array>(batch, "year")?;
    let tour_no = column::<Int64Array>(batch, "tour_no")?;
    let winner = column::<StringArray>(batch, "winner")?;
    let country = column::<StringArray>(batch, "country")?;
    let team = column::<StringArray>(batch, "team")?;
    let length = column::<Float64Array>(batch, "tour_overall_length_km")?;
    let age = column::<Int64Array>(batch, "age")?;
    let bmi = column::<Float64Array>(batch, "bmi")?;
    let weight = column::<Float64Array>(batch, "weight_kg")?;
    let height = column::<Float64Array>(batch, "height_m")?;
    let rider_type = column::<StringArray>(batch, "rider_type")?;
    let close_rider_type = column::<StringArray>(batch, "close_rider_type")?;

    Ok((0..batch.num_rows())
        .map(|i| ValidatedRecord {
            year: opt_i64(year, i),
            tour_no: opt_i64(tour_no, i),
            winner: string(winner, i),
            country: string(country, i),
            team: string(team, i),
            tour_overall_length_km: opt_f64(length, i),
            age: opt_i64(age, i),
            bmi: opt_f64(bmi, i),
            weight_kg: opt_f64(weight, i),
            height_m: opt_f64(height, i),
            rider_type: string(rider_type, i),
            close_rider_type: string(close_rider_type, i),
        })
        .collect())
}
