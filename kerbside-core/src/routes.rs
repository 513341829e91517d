//! Route planning, lifecycle, and progress math.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access;
use crate::error::{CoreError, Result};
use crate::geo;
use crate::model::{
    Bin, BinId, Collection, NewRoute, Principal, Route, RouteId, RouteStats, RouteStatus,
    RouteStop, RouteUpdate, UserId,
};
use crate::numeric::{count_to_f64, percent, rounded_minutes, span_of_minutes};

/// Minutes per remaining stop assumed before a route has measured statistics.
pub const DEFAULT_MINUTES_PER_BIN: f64 = 10.0;

/// Share of stops serviced, rounded to a whole percent; 0 for a route without stops.
#[must_use]
pub fn progress(route: &Route) -> u8 {
    let serviced = route
        .stops
        .iter()
        .filter(|stop| route.completed_bins.contains(&stop.bin))
        .count();
    percent(serviced, route.stops.len())
}

/// Stops not yet serviced, in visiting order.
#[must_use]
pub fn remaining_stops(route: &Route) -> Vec<&RouteStop> {
    route
        .stops
        .iter()
        .filter(|stop| !route.completed_bins.contains(&stop.bin))
        .collect()
}

/// Expected finishing time if the remaining stops take the measured (or default) pace.
#[must_use]
pub fn estimated_completion(route: &Route, now: DateTime<Utc>) -> DateTime<Utc> {
    let pace = if route.stats.average_minutes_per_bin > 0.0 {
        route.stats.average_minutes_per_bin
    } else {
        DEFAULT_MINUTES_PER_BIN
    };
    let remaining = count_to_f64(remaining_stops(route).len());
    now + span_of_minutes(remaining * pace)
}

/// Scheduled in the past, not started, and not fully serviced.
#[must_use]
pub fn is_overdue(route: &Route, now: DateTime<Utc>) -> bool {
    route.status == RouteStatus::Active && route.scheduled_at < now && progress(route) < 100
}

// Sort `stops` by order and measure them, failing when one names a bin not in `bins`.
fn lay_out(mut stops: Vec<RouteStop>, bins: &[Bin]) -> Result<(Vec<RouteStop>, f64)> {
    let by_id: HashMap<&BinId, &Bin> = bins.iter().map(|bin| (&bin.id, bin)).collect();
    if stops.iter().any(|stop| !by_id.contains_key(&stop.bin)) {
        return Err(CoreError::invalid_input("some bins not found"));
    }
    stops.sort_by_key(|stop| stop.order);
    let points: Vec<_> = stops
        .iter()
        .filter_map(|stop| by_id.get(&stop.bin))
        .map(|bin| bin.location.coordinates)
        .collect();
    Ok((stops, geo::path_length_km(&points)))
}

/// Build a route from validated input against the bins its stops reference.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] when any stop names a bin not in `bins`.
pub fn plan(input: NewRoute, bins: &[Bin], now: DateTime<Utc>) -> Result<Route> {
    let (stops, planned_distance_km) = lay_out(input.stops, bins)?;
    Ok(Route {
        id: RouteId::generate(),
        name: input.name,
        description: input.description,
        collector: input.collector,
        planned_distance_km,
        stops,
        status: RouteStatus::Active,
        scheduled_at: input.scheduled_at,
        started_at: None,
        ended_at: None,
        estimated_duration_min: input.estimated_duration_min,
        actual_duration_min: None,
        completed_bins: BTreeSet::new(),
        stats: RouteStats::default(),
        recurrence: input.recurrence,
        notes: input.notes,
        created_at: now,
    })
}

/// Apply an administrative edit.
///
/// `bins` are the bins named by the replacement stops, if any. Stops can only
/// change before the route starts.
///
/// # Errors
///
/// Returns [`CoreError::InvalidState`] for a finished route, or for new stops on a
/// route that is no longer active, and [`CoreError::InvalidInput`] when a new
/// stop names a bin not in `bins`.
pub fn edit(route: &mut Route, update: &RouteUpdate, bins: &[Bin]) -> Result<()> {
    if matches!(route.status, RouteStatus::Completed | RouteStatus::Cancelled) {
        return Err(CoreError::invalid_state(format!(
            "route {} is {} and can no longer be edited",
            route.id, route.status
        )));
    }
    if let Some(stops) = &update.stops {
        if route.status != RouteStatus::Active {
            return Err(CoreError::invalid_state(format!(
                "route {} is {}, stops can only change before it starts",
                route.id, route.status
            )));
        }
        let (stops, distance) = lay_out(stops.clone(), bins)?;
        route.stops = stops;
        route.planned_distance_km = distance;
        let kept: BTreeSet<BinId> = route
            .completed_bins
            .iter()
            .filter(|bin| route.has_stop(bin))
            .cloned()
            .collect();
        route.completed_bins = kept;
    }
    if let Some(name) = &update.name {
        route.name.clone_from(name);
    }
    if update.description.is_some() {
        route.description.clone_from(&update.description);
    }
    if update.notes.is_some() {
        route.notes.clone_from(&update.notes);
    }
    Ok(())
}

/// Begin driving the route.
///
/// # Errors
///
/// Returns [`CoreError::Forbidden`] for anyone but the route's collector and
/// [`CoreError::InvalidState`] unless the route is active.
pub fn start(route: &mut Route, collector: &UserId, now: DateTime<Utc>) -> Result<()> {
    access::require_owner(collector, &route.collector, "route")?;
    if route.status != RouteStatus::Active {
        return Err(CoreError::invalid_state(format!(
            "route {} is {}, only active routes can start",
            route.id, route.status
        )));
    }
    route.status = RouteStatus::InProgress;
    route.started_at = Some(now);
    Ok(())
}

/// Finish the route and recompute its statistics from `collections`.
///
/// `collections` are all collections referencing the route.
///
/// # Errors
///
/// Returns [`CoreError::Forbidden`] for anyone but the route's collector and
/// [`CoreError::InvalidState`] when the route already ended.
pub fn complete(
    route: &mut Route,
    collector: &UserId,
    collections: &[Collection],
    now: DateTime<Utc>,
) -> Result<()> {
    access::require_owner(collector, &route.collector, "route")?;
    if matches!(route.status, RouteStatus::Completed | RouteStatus::Cancelled) {
        return Err(CoreError::invalid_state(format!(
            "route {} is already {}",
            route.id, route.status
        )));
    }

    route.status = RouteStatus::Completed;
    route.ended_at = Some(now);
    route.actual_duration_min = route
        .started_at
        .and_then(|started| u32::try_from(rounded_minutes(now - started).max(0)).ok());

    let average_minutes_per_bin = match route.actual_duration_min {
        Some(minutes) if !route.stops.is_empty() => {
            f64::from(minutes) / count_to_f64(route.stops.len())
        }
        _ => 0.0,
    };
    route.stats = RouteStats {
        total_collections: u32::try_from(collections.len()).unwrap_or(u32::MAX),
        total_weight: collections.iter().map(Collection::total_weight).sum(),
        total_volume: collections.iter().map(Collection::total_volume).sum(),
        average_minutes_per_bin,
    };
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Completion of a route, applied by the store together with a fresh read of
/// the route's collections.
pub struct RouteCompletion {
    /// Route being finished.
    pub route: RouteId,
    /// Collector reporting the end.
    pub collector: UserId,
    /// End time.
    pub completed_at: DateTime<Utc>,
}

impl RouteCompletion {
    /// Finish `route` with `collections`, every collection referencing it as
    /// currently stored.
    ///
    /// # Errors
    ///
    /// Any error of [`complete`].
    pub fn apply(&self, route: &mut Route, collections: &[Collection]) -> Result<()> {
        complete(route, &self.collector, collections, self.completed_at)
    }
}

/// Pause or cancel the route.
///
/// # Errors
///
/// Returns [`CoreError::Forbidden`] unless `actor` is an admin or the route's
/// collector, [`CoreError::InvalidInput`] for a target other than paused or
/// cancelled, and [`CoreError::InvalidState`] unless the route is active or in progress.
pub fn halt(route: &mut Route, actor: &Principal, target: RouteStatus) -> Result<()> {
    if !actor.is_admin() {
        access::require_owner(&actor.id, &route.collector, "route")?;
    }
    if !matches!(target, RouteStatus::Paused | RouteStatus::Cancelled) {
        return Err(CoreError::invalid_input(format!(
            "routes can only be paused or cancelled, not set to {target}"
        )));
    }
    if !matches!(route.status, RouteStatus::Active | RouteStatus::InProgress) {
        return Err(CoreError::invalid_state(format!(
            "route {} is {}",
            route.id, route.status
        )));
    }
    route.status = target;
    Ok(())
}

/// Route half of a completed collection: mark the bin serviced and count the pickup.
pub fn record_completed_bin(route: &mut Route, bin: &BinId) {
    if route.has_stop(bin) {
        route.completed_bins.insert(bin.clone());
    }
    route.stats.total_collections = route.stats.total_collections.saturating_add(1);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A route plus the progress figures derived from it.
pub struct RouteView {
    /// The route.
    pub route: Route,
    /// Percent of stops serviced.
    pub progress: u8,
    /// Stops not yet serviced.
    pub remaining: Vec<RouteStop>,
    /// Expected finishing time.
    pub estimated_completion: DateTime<Utc>,
    /// Whether the route should already have started.
    pub overdue: bool,
}

impl RouteView {
    /// Derive the view of `route` at `now`.
    #[must_use]
    pub fn at(route: Route, now: DateTime<Utc>) -> Self {
        Self {
            progress: progress(&route),
            remaining: remaining_stops(&route).into_iter().cloned().collect(),
            estimated_completion: estimated_completion(&route, now),
            overdue: is_overdue(&route, now),
            route,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{
        BinLocation, BinStats, BinStatus, CollectionId, CollectionKind, CollectionStatus,
        GeoPoint, Role, WasteAmount, WasteCategory, WasteComposition,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap()
    }

    fn collector() -> UserId {
        UserId::from("user-driver")
    }

    fn stop(bin: &str, order: u32) -> RouteStop {
        RouteStop {
            bin: BinId::from(bin),
            order,
            estimated_minutes: None,
        }
    }

    fn route_with(stops: &[&str], completed: &[&str]) -> Route {
        Route {
            id: RouteId::from("route-1"),
            name: "Innenstadt".to_owned(),
            description: None,
            collector: collector(),
            stops: stops
                .iter()
                .zip(1..)
                .map(|(bin, order)| stop(bin, order))
                .collect(),
            status: RouteStatus::Active,
            scheduled_at: now(),
            started_at: None,
            ended_at: None,
            estimated_duration_min: None,
            actual_duration_min: None,
            planned_distance_km: 0.0,
            completed_bins: completed.iter().map(|bin| BinId::from(*bin)).collect(),
            stats: RouteStats::default(),
            recurrence: None,
            notes: None,
            created_at: now(),
        }
    }

    fn bin(id: &str, latitude: f64) -> Bin {
        Bin {
            id: BinId::from(id),
            code: format!("BIN-{id}"),
            scan_token: format!("kerbside:BIN-{id}"),
            location: BinLocation {
                name: id.to_owned(),
                address: None,
                landmark: None,
                coordinates: GeoPoint::new(latitude, 6.0),
            },
            category: WasteCategory::General,
            capacity_percent: 100,
            fill_level: 0,
            status: BinStatus::Empty,
            collection_frequency_days: 7,
            last_collected_at: None,
            last_updated_at: now(),
            assigned_collector: Some(collector()),
            active: true,
            stats: BinStats::default(),
            maintenance_history: Vec::new(),
            created_at: now(),
        }
    }

    fn weighed_collection(weight: f64) -> Collection {
        Collection {
            id: CollectionId::generate(),
            bin: BinId::from("a"),
            collector: collector(),
            resident: None,
            kind: CollectionKind::Scheduled,
            status: CollectionStatus::Completed,
            scheduled_at: now(),
            completed_at: Some(now()),
            fill_level_before: Some(80),
            fill_level_after: 0,
            composition: WasteComposition {
                general: Some(WasteAmount {
                    weight: Some(weight),
                    volume: Some(100.0),
                }),
                ..WasteComposition::default()
            },
            notes: None,
            rating: None,
            feedback: None,
            route: Some(RouteId::from("route-1")),
            payment: None,
            created_at: now(),
        }
    }

    #[test]
    fn progress_of_an_empty_route_is_zero() {
        assert_eq!(progress(&route_with(&[], &[])), 0);
    }

    #[test]
    fn progress_rounds_to_whole_percent() {
        assert_eq!(progress(&route_with(&["a", "b", "c"], &["b"])), 33);
        assert_eq!(progress(&route_with(&["a", "b", "c"], &["a", "b"])), 67);
        assert_eq!(progress(&route_with(&["a", "b"], &["a", "b"])), 100);
    }

    #[test]
    fn remaining_stops_keep_order() {
        let route = route_with(&["a", "b", "c"], &["b"]);
        let remaining: Vec<&str> = remaining_stops(&route)
            .iter()
            .map(|stop| stop.bin.0.as_str())
            .collect();
        assert_eq!(remaining, vec!["a", "c"]);
    }

    #[test]
    fn estimate_uses_default_pace_until_measured() {
        let mut route = route_with(&["a", "b", "c"], &["a"]);
        assert_eq!(estimated_completion(&route, now()), now() + Duration::minutes(20));

        route.stats.average_minutes_per_bin = 4.5;
        assert_eq!(estimated_completion(&route, now()), now() + Duration::minutes(9));
    }

    #[test]
    fn overdue_only_while_active_and_unfinished() {
        let later = now() + Duration::hours(1);
        let mut route = route_with(&["a", "b"], &["a"]);
        assert!(is_overdue(&route, later));
        assert!(!is_overdue(&route, now()));

        route.completed_bins.insert(BinId::from("b"));
        assert!(!is_overdue(&route, later));

        let mut started = route_with(&["a", "b"], &[]);
        started.status = RouteStatus::InProgress;
        assert!(!is_overdue(&started, later));
    }

    #[test]
    fn planning_sorts_stops_and_measures_distance() {
        let input = NewRoute {
            name: "Nord".to_owned(),
            description: None,
            collector: collector(),
            stops: vec![stop("c", 3), stop("a", 1), stop("b", 2)],
            scheduled_at: now(),
            estimated_duration_min: Some(45),
            recurrence: None,
            notes: None,
        };
        let bins = [bin("a", 50.0), bin("b", 50.1), bin("c", 50.2)];
        let route = plan(input, &bins, now()).unwrap();
        let order: Vec<&str> = route.stops.iter().map(|stop| stop.bin.0.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        let direct = geo::distance_km(GeoPoint::new(50.0, 6.0), GeoPoint::new(50.2, 6.0));
        assert!((route.planned_distance_km - direct).abs() < 1e-6);
        assert_eq!(route.status, RouteStatus::Active);
    }

    #[test]
    fn planning_rejects_unknown_bins() {
        let input = NewRoute {
            name: "Süd".to_owned(),
            description: None,
            collector: collector(),
            stops: vec![stop("a", 1), stop("ghost", 2)],
            scheduled_at: now(),
            estimated_duration_min: None,
            recurrence: None,
            notes: None,
        };
        let err = plan(input, &[bin("a", 50.0)], now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn only_the_owner_starts_an_active_route() {
        let mut route = route_with(&["a"], &[]);
        let err = start(&mut route, &UserId::from("user-other"), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        start(&mut route, &collector(), now()).unwrap();
        assert_eq!(route.status, RouteStatus::InProgress);
        assert_eq!(route.started_at, Some(now()));

        let err = start(&mut route, &collector(), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn completion_measures_duration_and_totals() {
        let mut route = route_with(&["a", "b", "c", "d"], &["a", "b"]);
        start(&mut route, &collector(), now()).unwrap();
        let ended = now() + Duration::minutes(42) + Duration::seconds(31);
        let collections = [weighed_collection(12.5), weighed_collection(7.5)];

        complete(&mut route, &collector(), &collections, ended).unwrap();
        assert_eq!(route.status, RouteStatus::Completed);
        assert_eq!(route.actual_duration_min, Some(43));
        assert_eq!(route.stats.total_collections, 2);
        assert!((route.stats.total_weight - 20.0).abs() < 1e-9);
        assert!((route.stats.total_volume - 200.0).abs() < 1e-9);
        assert!((route.stats.average_minutes_per_bin - 10.75).abs() < 1e-9);

        let err = complete(&mut route, &collector(), &collections, ended).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn completing_an_unstarted_route_has_no_duration() {
        let mut route = route_with(&["a"], &[]);
        complete(&mut route, &collector(), &[], now()).unwrap();
        assert_eq!(route.actual_duration_min, None);
        assert!(route.stats.average_minutes_per_bin.abs() < f64::EPSILON);
    }

    #[test]
    fn halting_respects_owner_admin_and_state() {
        let mut route = route_with(&["a"], &[]);
        let stranger = Principal::new(UserId::from("user-x"), Role::Collector);
        let admin = Principal::new(UserId::from("user-admin"), Role::Admin);

        let err = halt(&mut route, &stranger, RouteStatus::Paused).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        halt(&mut route, &admin, RouteStatus::Paused).unwrap();
        assert_eq!(route.status, RouteStatus::Paused);

        let err = halt(&mut route, &admin, RouteStatus::Cancelled).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn only_stop_bins_join_the_completed_set() {
        let mut route = route_with(&["a", "b"], &[]);
        record_completed_bin(&mut route, &BinId::from("a"));
        record_completed_bin(&mut route, &BinId::from("z"));
        assert_eq!(route.completed_bins, BTreeSet::from([BinId::from("a")]));
        assert_eq!(route.stats.total_collections, 2);
    }

    #[test]
    fn route_completion_counts_the_collections_it_is_given() {
        let mut route = route_with(&["a", "b"], &["a"]);
        route.stats.total_collections = 1;
        let completion = RouteCompletion {
            route: route.id.clone(),
            collector: collector(),
            completed_at: now(),
        };
        let collections = [weighed_collection(3.0), weighed_collection(4.0)];
        completion.apply(&mut route, &collections).unwrap();
        assert_eq!(route.status, RouteStatus::Completed);
        assert_eq!(route.stats.total_collections, 2);
    }

    #[test]
    fn editing_replaces_stops_and_remeasures() {
        let mut route = route_with(&["a"], &[]);
        let update = RouteUpdate {
            name: Some("Nord-Ost".to_owned()),
            notes: Some("gate code 42".to_owned()),
            stops: Some(vec![stop("c", 2), stop("b", 1)]),
            ..RouteUpdate::default()
        };
        edit(&mut route, &update, &[bin("b", 50.0), bin("c", 50.1)]).unwrap();

        let order: Vec<&str> = route.stops.iter().map(|stop| stop.bin.0.as_str()).collect();
        assert_eq!(order, vec!["b", "c"]);
        let direct = geo::distance_km(GeoPoint::new(50.0, 6.0), GeoPoint::new(50.1, 6.0));
        assert!((route.planned_distance_km - direct).abs() < 1e-6);
        assert_eq!(route.name, "Nord-Ost");
        assert_eq!(route.notes.as_deref(), Some("gate code 42"));
        assert!(route.description.is_none());
    }

    #[test]
    fn stops_are_frozen_once_driving() {
        let mut route = route_with(&["a"], &[]);
        start(&mut route, &collector(), now()).unwrap();
        let update = RouteUpdate {
            stops: Some(vec![stop("b", 1)]),
            ..RouteUpdate::default()
        };
        let err = edit(&mut route, &update, &[bin("b", 50.0)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let rename = RouteUpdate {
            name: Some("Renamed".to_owned()),
            ..RouteUpdate::default()
        };
        edit(&mut route, &rename, &[]).unwrap();
        assert_eq!(route.name, "Renamed");

        complete(&mut route, &collector(), &[], now()).unwrap();
        let err = edit(&mut route, &rename, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn editing_rejects_unknown_bins() {
        let mut route = route_with(&["a"], &[]);
        let update = RouteUpdate {
            stops: Some(vec![stop("ghost", 1)]),
            ..RouteUpdate::default()
        };
        let err = edit(&mut route, &update, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(route.stops.len(), 1);
    }
}
