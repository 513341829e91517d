//! Input validation run before any state is touched.
//!
//! Every check fails with [`CoreError::InvalidInput`].

use std::collections::HashSet;

use crate::error::{CoreError, Result};
use crate::geo::NearbyQuery;
use crate::model::{
    BinUpdate, CollectionRequest, CollectionUpdate, GeoPoint, LocationPatch, NewBin, NewRoute,
    PageRequest, RouteStop, RouteUpdate, WasteCategory, WasteComposition,
};

/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: usize = 100;
/// Longest rolling report window, in days.
pub const MAX_REPORT_DAYS: i64 = 36_500;

/// Latitude and longitude are finite and within range.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] for out-of-range coordinates.
pub fn coordinates(point: GeoPoint) -> Result<()> {
    if !(point.latitude.is_finite() && (-90.0..=90.0).contains(&point.latitude)) {
        return Err(CoreError::invalid_input(format!(
            "latitude {} must be within -90..=90",
            point.latitude
        )));
    }
    if !(point.longitude.is_finite() && (-180.0..=180.0).contains(&point.longitude)) {
        return Err(CoreError::invalid_input(format!(
            "longitude {} must be within -180..=180",
            point.longitude
        )));
    }
    Ok(())
}

fn capacity(capacity_percent: u8) -> Result<()> {
    if (1..=100).contains(&capacity_percent) {
        Ok(())
    } else {
        Err(CoreError::invalid_input(format!(
            "capacity {capacity_percent} must be within 1..=100"
        )))
    }
}

fn frequency(days: u32) -> Result<()> {
    if days == 0 {
        return Err(CoreError::invalid_input(
            "collection frequency must be at least one day",
        ));
    }
    Ok(())
}

fn non_blank(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoreError::invalid_input(format!("{field} is required")));
    }
    Ok(())
}

/// Registration input for a bin.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] for a blank name, bad coordinates, capacity or cadence.
pub fn new_bin(input: &NewBin) -> Result<()> {
    non_blank(&input.location.name, "location name")?;
    coordinates(input.location.coordinates)?;
    input.capacity_percent.map_or(Ok(()), capacity)?;
    input.collection_frequency_days.map_or(Ok(()), frequency)
}

/// Administrative bin edit.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] for a blank name, bad coordinates, capacity or cadence.
pub fn bin_update(update: &BinUpdate) -> Result<()> {
    if let Some(LocationPatch {
        name, coordinates: point, ..
    }) = &update.location
    {
        if let Some(name) = name {
            non_blank(name, "location name")?;
        }
        point.map_or(Ok(()), coordinates)?;
    }
    update.capacity_percent.map_or(Ok(()), capacity)?;
    update.collection_frequency_days.map_or(Ok(()), frequency)
}

/// Proximity search parameters.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] for bad coordinates or a non-positive radius.
pub fn nearby(query: &NearbyQuery) -> Result<()> {
    coordinates(query.origin)?;
    let radius = query.radius();
    if !radius.is_finite() || radius <= 0.0 {
        return Err(CoreError::invalid_input(format!(
            "radius {radius} must be a positive number of kilometres"
        )));
    }
    Ok(())
}

/// A disposal adds a strictly positive amount.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] when `delta <= 0`.
pub fn fill_delta(delta: i32) -> Result<()> {
    if delta <= 0 {
        return Err(CoreError::invalid_input(format!(
            "fill delta {delta} must be positive"
        )));
    }
    Ok(())
}

/// A fill level is a percentage.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] above 100.
pub fn fill_level(level: u8) -> Result<()> {
    if level > 100 {
        return Err(CoreError::invalid_input(format!(
            "fill level {level} must be within 0..=100"
        )));
    }
    Ok(())
}

/// Ratings run from one to five stars.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] outside 1..=5.
pub fn rating(stars: u8) -> Result<()> {
    if !(1..=5).contains(&stars) {
        return Err(CoreError::invalid_input(format!(
            "rating {stars} must be within 1..=5"
        )));
    }
    Ok(())
}

/// Weights and volumes are finite and non-negative.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] naming the offending category.
pub fn composition(composition: &WasteComposition) -> Result<()> {
    for category in WasteCategory::ALL {
        let Some(amount) = composition.amount(category) else {
            continue;
        };
        let measured = [amount.weight, amount.volume];
        if measured
            .iter()
            .flatten()
            .any(|value| !value.is_finite() || *value < 0.0)
        {
            return Err(CoreError::invalid_input(format!(
                "{category} weight and volume must be non-negative"
            )));
        }
    }
    Ok(())
}

/// A maintenance log entry needs a kind.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] for a blank kind.
pub fn maintenance(kind: &str) -> Result<()> {
    non_blank(kind, "maintenance kind")
}

/// Pickup request input.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] for a bad payload.
pub fn collection_request(request: &CollectionRequest) -> Result<()> {
    composition(&request.composition)
}

/// Collector status report.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] for a bad payload or fill level.
pub fn collection_update(update: &CollectionUpdate) -> Result<()> {
    if let Some(payload) = &update.composition {
        composition(payload)?;
    }
    update.fill_level_after.map_or(Ok(()), fill_level)
}

/// Route planning input.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] for a blank name, no stops, or a repeated bin.
pub fn new_route(route: &NewRoute) -> Result<()> {
    non_blank(&route.name, "route name")?;
    stops(&route.stops)
}

/// Administrative route edit.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] for a blank name, an empty stop list, or a repeated bin.
pub fn route_update(update: &RouteUpdate) -> Result<()> {
    if let Some(name) = &update.name {
        non_blank(name, "route name")?;
    }
    update.stops.as_deref().map_or(Ok(()), stops)
}

fn stops(stops: &[RouteStop]) -> Result<()> {
    if stops.is_empty() {
        return Err(CoreError::invalid_input("at least one bin is required"));
    }
    let mut seen = HashSet::new();
    if let Some(repeated) = stops.iter().find(|stop| !seen.insert(&stop.bin)) {
        return Err(CoreError::invalid_input(format!(
            "bin {} appears more than once",
            repeated.bin
        )));
    }
    Ok(())
}

/// Page selection.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] for page 0 or a limit outside `1..=MAX_PAGE_LIMIT`.
pub fn page(request: PageRequest) -> Result<()> {
    if request.page == 0 {
        return Err(CoreError::invalid_input("pages start at 1"));
    }
    if !(1..=MAX_PAGE_LIMIT).contains(&request.limit) {
        return Err(CoreError::invalid_input(format!(
            "limit must be within 1..={MAX_PAGE_LIMIT}"
        )));
    }
    Ok(())
}

/// Rolling report windows span one to [`MAX_REPORT_DAYS`] days.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] outside that range.
pub fn report_days(days: i64) -> Result<()> {
    if !(1..=MAX_REPORT_DAYS).contains(&days) {
        return Err(CoreError::invalid_input(format!(
            "report period must be within 1..={MAX_REPORT_DAYS} days"
        )));
    }
    Ok(())
}

/// A refund names a reason and, when partial, an amount within what was paid.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] for a blank reason or an amount that is not
/// positive or exceeds `paid`.
pub fn refund(amount: Option<f64>, reason: &str, paid: f64) -> Result<()> {
    non_blank(reason, "refund reason")?;
    if let Some(amount) = amount
        && !(amount.is_finite() && amount > 0.0 && amount <= paid)
    {
        return Err(CoreError::invalid_input(format!(
            "refund of {amount} must be positive and at most {paid}"
        )));
    }
    Ok(())
}
