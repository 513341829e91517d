//! Routes: ordered worklists of bins for one collector.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::{BinId, RouteId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One stop of a route.
pub struct RouteStop {
    /// Bin to service.
    pub bin: BinId,
    /// Position in the visiting sequence.
    pub order: u32,
    /// Planned minutes at this stop.
    pub estimated_minutes: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Lifecycle of a route.
pub enum RouteStatus {
    /// Scheduled, not started.
    #[default]
    Active,
    /// Collector is driving it.
    InProgress,
    /// Finished.
    Completed,
    /// Temporarily halted.
    Paused,
    /// Called off.
    Cancelled,
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            RouteStatus::Active => "active",
            RouteStatus::InProgress => "in_progress",
            RouteStatus::Completed => "completed",
            RouteStatus::Paused => "paused",
            RouteStatus::Cancelled => "cancelled",
        };
        write!(formatter, "{slug}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Materialized counters of a route.
pub struct RouteStats {
    /// Collections attached to the route.
    pub total_collections: u32,
    /// Total weight collected, kilograms.
    pub total_weight: f64,
    /// Total volume collected, litres.
    pub total_volume: f64,
    /// Actual minutes per stop, 0 until the route completes.
    pub average_minutes_per_bin: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// How often a recurring route repeats.
pub enum RecurrenceFrequency {
    /// Every day.
    Daily,
    /// Every week.
    Weekly,
    /// Every other week.
    BiWeekly,
    /// Every month.
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Stored recurrence pattern of a route.
pub struct Recurrence {
    /// Repeat cadence.
    pub frequency: RecurrenceFrequency,
    /// Weekdays the route runs on.
    pub weekdays: Vec<Weekday>,
    /// Interval for bi-weekly and monthly cadences.
    pub interval: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Ordered worklist for one collector on one day.
pub struct Route {
    /// Identifier.
    pub id: RouteId,
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Collector driving the route.
    pub collector: UserId,
    /// Stops in visiting order.
    pub stops: Vec<RouteStop>,
    /// Lifecycle status.
    pub status: RouteStatus,
    /// Planned start.
    pub scheduled_at: DateTime<Utc>,
    /// Actual start.
    pub started_at: Option<DateTime<Utc>>,
    /// Actual end.
    pub ended_at: Option<DateTime<Utc>>,
    /// Planned duration in minutes.
    pub estimated_duration_min: Option<u32>,
    /// Measured duration in minutes, set at completion.
    pub actual_duration_min: Option<u32>,
    /// Great-circle length of the stop sequence.
    pub planned_distance_km: f64,
    /// Bins serviced so far; always a subset of the stops' bins.
    pub completed_bins: BTreeSet<BinId>,
    /// Materialized counters.
    pub stats: RouteStats,
    /// Stored recurrence pattern.
    pub recurrence: Option<Recurrence>,
    /// Operator notes.
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Route {
    /// Whether `bin` is one of this route's stops.
    #[must_use]
    pub fn has_stop(&self, bin: &BinId) -> bool {
        self.stops.iter().any(|stop| &stop.bin == bin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Input for planning a route.
pub struct NewRoute {
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Collector driving the route.
    pub collector: UserId,
    /// Stops; re-sorted by `order`.
    pub stops: Vec<RouteStop>,
    /// Planned start.
    pub scheduled_at: DateTime<Utc>,
    /// Planned duration in minutes.
    pub estimated_duration_min: Option<u32>,
    /// Recurrence pattern to store.
    pub recurrence: Option<Recurrence>,
    /// Operator notes.
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Administrative route edit; absent fields are left alone.
pub struct RouteUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New operator notes.
    pub notes: Option<String>,
    /// Replacement stop list; re-sorted by `order`.
    pub stops: Option<Vec<RouteStop>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Filter for route listings; absent fields match everything.
pub struct RouteFilter {
    /// Only routes in this status.
    pub status: Option<RouteStatus>,
    /// Only routes of this collector.
    pub collector: Option<UserId>,
}

impl RouteFilter {
    /// Whether `route` passes this filter.
    #[must_use]
    pub fn matches(&self, route: &Route) -> bool {
        self.status.is_none_or(|status| route.status == status)
            && self
                .collector
                .as_ref()
                .is_none_or(|collector| &route.collector == collector)
    }
}
