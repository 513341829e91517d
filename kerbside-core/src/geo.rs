//! Great-circle distances and proximity ranking of bins.

use serde::{Deserialize, Serialize};

use crate::model::{Bin, GeoPoint};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;
/// Maximum number of bins returned by [`nearby`].
pub const NEARBY_LIMIT: usize = 20;
/// Search radius used when a caller does not give one.
pub const DEFAULT_RADIUS_KM: f64 = 5.0;

/// Haversine distance between two points in kilometres.
///
/// Symmetric, non-negative, and zero for identical points.
#[must_use]
pub fn distance_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let haversine = (delta_lat / 2.0).sin().powi(2)
        + from.latitude.to_radians().cos()
            * to.latitude.to_radians().cos()
            * (delta_lon / 2.0).sin().powi(2);
    let haversine = haversine.clamp(0.0, 1.0);

    let central_angle = 2.0 * haversine.sqrt().atan2((1.0 - haversine).sqrt());
    EARTH_RADIUS_KM * central_angle
}

/// Length of the path visiting `points` in order.
#[must_use]
pub fn path_length_km(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|leg| match leg {
            [from, to] => distance_km(*from, *to),
            _ => 0.0,
        })
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A bin together with its distance from the search origin.
pub struct NearbyBin {
    /// The bin.
    pub bin: Bin,
    /// Distance from the origin in kilometres.
    pub distance_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Proximity search parameters.
pub struct NearbyQuery {
    /// Search origin.
    pub origin: GeoPoint,
    /// Search radius; [`DEFAULT_RADIUS_KM`] when absent.
    pub radius_km: Option<f64>,
}

impl NearbyQuery {
    /// Radius to search within.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius_km.unwrap_or(DEFAULT_RADIUS_KM)
    }
}

/// Active `candidates` within `radius_km` of `origin`, nearest first.
///
/// At most [`NEARBY_LIMIT`] bins are returned; equal distances keep input order.
#[must_use]
pub fn nearby(
    origin: GeoPoint,
    radius_km: f64,
    candidates: impl IntoIterator<Item = Bin>,
) -> Vec<NearbyBin> {
    let mut ranked: Vec<NearbyBin> = candidates
        .into_iter()
        .filter(|bin| bin.active)
        .filter_map(|bin| {
            let distance_km = distance_km(origin, bin.location.coordinates);
            (distance_km <= radius_km).then_some(NearbyBin { bin, distance_km })
        })
        .collect();

    // stable: ties keep candidate order
    ranked.sort_by(|left, right| left.distance_km.total_cmp(&right.distance_km));
    ranked.truncate(NEARBY_LIMIT);
    ranked
}
