//! Fees charged for bulk collections.

use crate::model::{WasteCategory, WasteComposition};
use crate::numeric::round_cents;

/// Flat part of every bulk collection fee.
pub const BULK_BASE_FEE: f64 = 50.0;

/// Price per kilogram of `category` in a bulk collection.
#[must_use]
pub fn rate_per_kg(category: WasteCategory) -> f64 {
    match category {
        WasteCategory::General => 0.5,
        WasteCategory::Recyclable => 0.3,
        WasteCategory::Organic => 0.4,
        WasteCategory::Hazardous => 2.0,
    }
}

/// Fee of a bulk collection with the given payload, rounded to cents.
#[must_use]
pub fn bulk_fee(composition: &WasteComposition) -> f64 {
    let weighted: f64 = WasteCategory::ALL
        .iter()
        .map(|category| composition.weight_of(*category) * rate_per_kg(*category))
        .sum();
    round_cents(BULK_BASE_FEE + weighted)
}
