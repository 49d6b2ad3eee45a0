// src/transform/record.rs

use serde::{Deserialize, Serialize};

/// Number of leading CSV columns a row must carry to become a record.
pub const RECORD_ARITY: usize = 12;

/// One Tour de France winner, typed and ready for the warehouse.
///
/// Numeric columns are `None` when the source cell was blank. Text columns are
/// never absent: a missing or blank cell becomes `""`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRecord {
    pub year: Option<i64>,
    pub tour_no: Option<i64>,
    pub winner: String,
    pub country: String,
    pub team: String,
    pub tour_overall_length_km: Option<f64>,
    pub age: Option<i64>,
    pub bmi: Option<f64>,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub rider_type: String,
    pub close_rider_type: String,
}
