pub mod arrow;
pub mod types;

pub use self::arrow::{batch_to_records, build_arrow_schema, map_to_arrow_type, records_to_batch};
pub use types::{FieldMode, FieldType, TableField, TableSchema};

use once_cell::sync::Lazy;

static WINNERS_SCHEMA: Lazy<TableSchema> = Lazy::new(|| {
    use FieldType as T;
    let cols = [
        ("year", T::Integer),
        ("tour_no", T::Integer),
        ("winner", T::String),
        ("country", T::String),
        ("team", T::String),
        ("tour_overall_length_km", T::Float),
        ("age", T::Integer),
        ("bmi", T::Float),
        ("weight_kg", T::Float),
        ("height_m", T::Float),
        ("rider_type", T::String),
        ("close_rider_type", T::String),
    ];
    TableSchema {
        fields: cols
            .iter()
            .map(|(name, ty)| TableField::nullable(name, ty.clone()))
            .collect(),
    }
});

/// Destination schema of the winners table, in `ValidatedRecord` field order.
pub fn winners_schema() -> &'static TableSchema {
    &WINNERS_SCHEMA
}
