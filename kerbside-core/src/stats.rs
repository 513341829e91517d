//! Read-side rollups over bins, collections, routes, users, and payments.
//!
//! Every report is a pure function of entity snapshots and a [`ReportWindow`].
//! Missing measurements count as zero; missing ratings are left out, so an
//! average over nothing is `None` rather than 0.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Days, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::bins;
use crate::error::{CoreError, Result};
use crate::model::{
    Bin, BinStatus, Collection, CollectionKind, CollectionStatus, Payment, PaymentStatus, Role,
    Route, RouteStatus, UserId, UserProfile, WasteCategory,
};
use crate::numeric::{mean, minutes_f64, round_cents};
use crate::validate;

/// Length of the rolling window used when a caller does not give one.
pub const DEFAULT_REPORT_DAYS: i64 = 30;
/// Number of collectors listed in the route leaderboard.
pub const TOP_COLLECTORS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Closed time interval `[start, end]`.
pub struct ReportWindow {
    /// First included instant.
    pub start: DateTime<Utc>,
    /// Last included instant.
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    /// The `days` days up to `now`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] when the start falls outside the
    /// representable time range.
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Result<Self> {
        let start = TimeDelta::try_days(days)
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| {
                CoreError::invalid_input(format!("a {days}-day report window is out of range"))
            })?;
        Ok(Self { start, end: now })
    }

    /// The explicit interval from `start` to `end`, both included.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] when `start` is after `end`.
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(CoreError::invalid_input(format!(
                "report start {start} is after its end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// From midnight UTC of `now`'s day until the next midnight.
    #[must_use]
    pub fn today(now: DateTime<Utc>) -> Self {
        let start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(now, |midnight| midnight.and_utc());
        let end = start
            .checked_add_days(Days::new(1))
            .map_or(now, |next| next - TimeDelta::nanoseconds(1));
        Self { start, end }
    }

    /// Whether `at` lies inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Period a report covers, as asked for by the caller.
pub enum ReportPeriod {
    /// Rolling window of this many days up to now.
    LastDays(i64),
    /// Fixed interval, both ends included.
    Between {
        /// First included instant.
        start: DateTime<Utc>,
        /// Last included instant.
        end: DateTime<Utc>,
    },
}

impl Default for ReportPeriod {
    fn default() -> Self {
        Self::LastDays(DEFAULT_REPORT_DAYS)
    }
}

impl ReportPeriod {
    /// Resolve the period against `now`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a day count outside
    /// `1..=MAX_REPORT_DAYS` or an interval that ends before it starts.
    pub fn window(self, now: DateTime<Utc>) -> Result<ReportWindow> {
        match self {
            Self::LastDays(days) => {
                validate::report_days(days)?;
                ReportWindow::last_days(now, days)
            }
            Self::Between { start, end } => ReportWindow::between(start, end),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Users holding one role.
pub struct RoleCount {
    /// Users with the role.
    pub count: usize,
    /// Of those, active accounts.
    pub active: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
/// Sum and count of payments.
pub struct PaymentTotals {
    /// Sum of amounts, rounded to cents.
    pub amount: f64,
    /// Number of payments.
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Operator landing page figures.
pub struct Dashboard {
    /// Collections created today.
    pub collections_today: usize,
    /// Completed payments created today.
    pub revenue_today: PaymentTotals,
    /// Registered users.
    pub total_users: usize,
    /// Registered bins.
    pub total_bins: usize,
    /// Bins currently active.
    pub active_bins: usize,
    /// Active bins due for a pickup now.
    pub bins_needing_collection: usize,
    /// Users per role.
    pub users_by_role: BTreeMap<Role, RoleCount>,
    /// Mean minutes from scheduled to completed over completed pickups.
    pub average_completion_minutes: Option<f64>,
}

fn users_by_role(users: &[UserProfile]) -> BTreeMap<Role, RoleCount> {
    let mut by_role: BTreeMap<Role, RoleCount> = BTreeMap::new();
    for user in users {
        let entry = by_role.entry(user.role).or_default();
        entry.count += 1;
        if user.active {
            entry.active += 1;
        }
    }
    by_role
}

/// Dashboard figures at `now`.
#[must_use]
pub fn dashboard(
    now: DateTime<Utc>,
    users: &[UserProfile],
    bins: &[Bin],
    collections: &[Collection],
    payments: &[Payment],
) -> Dashboard {
    let today = ReportWindow::today(now);
    let paid_today: Vec<&Payment> = payments
        .iter()
        .filter(|payment| payment.status == PaymentStatus::Completed)
        .filter(|payment| today.contains(payment.created_at))
        .collect();
    let active: Vec<&Bin> = bins.iter().filter(|bin| bin.active).collect();

    Dashboard {
        collections_today: collections
            .iter()
            .filter(|collection| today.contains(collection.created_at))
            .count(),
        revenue_today: PaymentTotals {
            amount: round_cents(paid_today.iter().map(|payment| payment.amount).sum()),
            count: paid_today.len(),
        },
        total_users: users.len(),
        total_bins: bins.len(),
        active_bins: active.len(),
        bins_needing_collection: active
            .iter()
            .filter(|bin| bins::needs_collection(bin, now))
            .count(),
        users_by_role: users_by_role(users),
        average_completion_minutes: mean(collections.iter().filter_map(|collection| {
            let completed = collection.completed_at?;
            (collection.status == CollectionStatus::Completed)
                .then(|| minutes_f64(completed - collection.scheduled_at))
        })),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
/// Bins of one category.
pub struct CategoryFill {
    /// Number of bins.
    pub count: usize,
    /// Mean current fill level.
    pub average_fill_level: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Bin inventory breakdown.
pub struct BinReport {
    /// Bins per status.
    pub by_status: BTreeMap<BinStatus, usize>,
    /// Bins per category.
    pub by_category: BTreeMap<WasteCategory, CategoryFill>,
}

/// Bins registered inside `window`, by status and by category.
#[must_use]
pub fn bin_report(bins: &[Bin], window: ReportWindow) -> BinReport {
    let in_window: Vec<&Bin> = bins
        .iter()
        .filter(|bin| window.contains(bin.created_at))
        .collect();

    let mut by_status = BTreeMap::new();
    for bin in &in_window {
        *by_status.entry(bin.status).or_insert(0) += 1;
    }
    let by_category = WasteCategory::ALL
        .into_iter()
        .filter_map(|category| {
            let levels: Vec<f64> = in_window
                .iter()
                .filter(|bin| bin.category == category)
                .map(|bin| f64::from(bin.fill_level))
                .collect();
            (!levels.is_empty()).then(|| {
                (
                    category,
                    CategoryFill {
                        count: levels.len(),
                        average_fill_level: mean(levels),
                    },
                )
            })
        })
        .collect();
    BinReport {
        by_status,
        by_category,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
/// Completed pickups of one kind.
pub struct KindTotals {
    /// Number of completed pickups.
    pub count: usize,
    /// Total weight.
    pub total_weight: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Pickup volume and quality.
pub struct CollectionReport {
    /// Pickups created in the window.
    pub count: usize,
    /// Of those, completed.
    pub completed: usize,
    /// Total weight.
    pub total_weight: f64,
    /// Total volume.
    pub total_volume: f64,
    /// Mean over rated pickups.
    pub average_rating: Option<f64>,
    /// Completed pickups per kind.
    pub by_kind: BTreeMap<CollectionKind, KindTotals>,
}

/// Pickups created inside `window`.
#[must_use]
pub fn collection_report(collections: &[Collection], window: ReportWindow) -> CollectionReport {
    let in_window: Vec<&Collection> = collections
        .iter()
        .filter(|collection| window.contains(collection.created_at))
        .collect();

    let mut by_kind: BTreeMap<CollectionKind, KindTotals> = BTreeMap::new();
    for collection in in_window
        .iter()
        .filter(|collection| collection.status == CollectionStatus::Completed)
    {
        let totals = by_kind.entry(collection.kind).or_default();
        totals.count += 1;
        totals.total_weight += collection.total_weight();
    }

    CollectionReport {
        count: in_window.len(),
        completed: in_window
            .iter()
            .filter(|collection| collection.status == CollectionStatus::Completed)
            .count(),
        total_weight: in_window.iter().map(|collection| collection.total_weight()).sum(),
        total_volume: in_window.iter().map(|collection| collection.total_volume()).sum(),
        average_rating: mean(
            in_window
                .iter()
                .filter_map(|collection| collection.rating)
                .map(f64::from),
        ),
        by_kind,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
/// Routes in one status.
pub struct RouteStatusTotals {
    /// Number of routes.
    pub count: usize,
    /// Mean measured duration over routes that have one.
    pub average_duration_min: Option<f64>,
    /// Total weight.
    pub total_weight: f64,
    /// Total volume.
    pub total_volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One row of the route leaderboard.
pub struct CollectorRoutes {
    /// Collector.
    pub collector: UserId,
    /// Display name from the directory, if known.
    pub name: Option<String>,
    /// Completed routes.
    pub completed: usize,
    /// Sum of measured durations.
    pub total_duration_min: u64,
    /// Mean measured duration.
    pub average_duration_min: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Route throughput.
pub struct RouteReport {
    /// Routes per status.
    pub by_status: BTreeMap<RouteStatus, RouteStatusTotals>,
    /// Collectors with the most completed routes.
    pub top_collectors: Vec<CollectorRoutes>,
}

/// Routes created inside `window`.
#[must_use]
pub fn route_report(routes: &[Route], users: &[UserProfile], window: ReportWindow) -> RouteReport {
    let in_window: Vec<&Route> = routes
        .iter()
        .filter(|route| window.contains(route.created_at))
        .collect();

    let mut durations: BTreeMap<RouteStatus, Vec<f64>> = BTreeMap::new();
    let mut by_status: BTreeMap<RouteStatus, RouteStatusTotals> = BTreeMap::new();
    for route in &in_window {
        let totals = by_status.entry(route.status).or_default();
        totals.count += 1;
        totals.total_weight += route.stats.total_weight;
        totals.total_volume += route.stats.total_volume;
        if let Some(minutes) = route.actual_duration_min {
            durations
                .entry(route.status)
                .or_default()
                .push(f64::from(minutes));
        }
    }
    for (status, minutes) in durations {
        if let Some(totals) = by_status.get_mut(&status) {
            totals.average_duration_min = mean(minutes);
        }
    }

    let names: HashMap<&UserId, &str> = users
        .iter()
        .map(|user| (&user.id, user.name.as_str()))
        .collect();
    let mut per_collector: BTreeMap<&UserId, Vec<&Route>> = BTreeMap::new();
    for route in in_window
        .iter()
        .filter(|route| route.status == RouteStatus::Completed)
    {
        per_collector.entry(&route.collector).or_default().push(route);
    }

    let mut top_collectors: Vec<CollectorRoutes> = per_collector
        .into_iter()
        .map(|(collector, completed)| {
            let minutes: Vec<u32> = completed
                .iter()
                .filter_map(|route| route.actual_duration_min)
                .collect();
            CollectorRoutes {
                collector: collector.clone(),
                name: names.get(collector).map(|name| (*name).to_owned()),
                completed: completed.len(),
                total_duration_min: minutes.iter().map(|minutes| u64::from(*minutes)).sum(),
                average_duration_min: mean(minutes.iter().map(|minutes| f64::from(*minutes))),
            }
        })
        .collect();
    top_collectors.sort_by_key(|row| Reverse(row.completed));
    top_collectors.truncate(TOP_COLLECTORS);

    RouteReport {
        by_status,
        top_collectors,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Premium subscription uptake.
pub struct PremiumTotals {
    /// Premium residents.
    pub total: usize,
    /// Of those, with an unexpired subscription.
    pub active: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// User base breakdown.
pub struct UserReport {
    /// Users per role.
    pub by_role: BTreeMap<Role, RoleCount>,
    /// Premium uptake at `now`.
    pub premium: PremiumTotals,
    /// Users registered inside the window.
    pub registrations: usize,
    /// Residents whose last disposal lies inside the window.
    pub active_disposers: usize,
}

/// User base at `now`, with registrations and disposals inside `window`.
#[must_use]
pub fn user_report(users: &[UserProfile], window: ReportWindow, now: DateTime<Utc>) -> UserReport {
    let premium: Vec<&UserProfile> = users
        .iter()
        .filter(|user| user.role == Role::PremiumResident)
        .collect();
    UserReport {
        by_role: users_by_role(users),
        premium: PremiumTotals {
            total: premium.len(),
            active: premium
                .iter()
                .filter(|user| user.premium_active(now))
                .count(),
        },
        registrations: users
            .iter()
            .filter(|user| window.contains(user.created_at))
            .count(),
        active_disposers: users
            .iter()
            .filter(|user| user.role.is_resident())
            .filter(|user| {
                user.stats
                    .last_disposal_at
                    .is_some_and(|at| window.contains(at))
            })
            .count(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
/// Ledger totals.
pub struct PaymentReport {
    /// Sum of amounts, rounded to cents.
    pub total_amount: f64,
    /// Number of payments.
    pub count: usize,
    /// Of those, completed.
    pub completed: usize,
}

/// Payments created inside `window`.
#[must_use]
pub fn payment_report(payments: &[Payment], window: ReportWindow) -> PaymentReport {
    let in_window: Vec<&Payment> = payments
        .iter()
        .filter(|payment| window.contains(payment.created_at))
        .collect();
    PaymentReport {
        total_amount: round_cents(in_window.iter().map(|payment| payment.amount).sum()),
        count: in_window.len(),
        completed: in_window
            .iter()
            .filter(|payment| payment.status == PaymentStatus::Completed)
            .count(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Completed-pickup performance of one collector.
pub struct CollectorPerformance {
    /// Collector.
    pub collector: UserId,
    /// Display name from the directory, if known.
    pub name: Option<String>,
    /// Completed pickups.
    pub completed: usize,
    /// Mean rating over rated pickups.
    pub average_rating: Option<f64>,
    /// Total weight collected.
    pub total_weight: f64,
}

/// Per-collector performance over completed pickups created inside `window`,
/// busiest first.
#[must_use]
pub fn collector_performance(
    collections: &[Collection],
    users: &[UserProfile],
    window: ReportWindow,
) -> Vec<CollectorPerformance> {
    let mut grouped: BTreeMap<&UserId, Vec<&Collection>> = BTreeMap::new();
    for collection in collections.iter().filter(|collection| {
        collection.status == CollectionStatus::Completed && window.contains(collection.created_at)
    }) {
        grouped
            .entry(&collection.collector)
            .or_default()
            .push(collection);
    }

    let mut rows: Vec<CollectorPerformance> = grouped
        .into_iter()
        .map(|(collector, done)| CollectorPerformance {
            collector: collector.clone(),
            name: users
                .iter()
                .find(|user| &user.id == collector)
                .map(|user| user.name.clone()),
            completed: done.len(),
            average_rating: mean(
                done.iter()
                    .filter_map(|collection| collection.rating)
                    .map(f64::from),
            ),
            total_weight: done.iter().map(|collection| collection.total_weight()).sum(),
        })
        .collect();
    rows.sort_by_key(|row| Reverse(row.completed));
    rows
}
