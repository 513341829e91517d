//! Bins and the data needed to register or edit them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BinId, GeoPoint, UserId};

/// Nominal full-scale capacity of a newly registered bin.
pub const DEFAULT_CAPACITY_PERCENT: u8 = 100;
/// Collection cadence of a newly registered bin.
pub const DEFAULT_COLLECTION_FREQUENCY_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Waste stream a bin accepts.
pub enum WasteCategory {
    /// Mixed residual waste.
    #[default]
    General,
    /// Recyclables.
    Recyclable,
    /// Organic/compostable waste.
    Organic,
    /// Hazardous waste.
    Hazardous,
}

impl WasteCategory {
    /// Every category, in declaration order.
    pub const ALL: [WasteCategory; 4] = [
        WasteCategory::General,
        WasteCategory::Recyclable,
        WasteCategory::Organic,
        WasteCategory::Hazardous,
    ];
}

impl fmt::Display for WasteCategory {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            WasteCategory::General => "general",
            WasteCategory::Recyclable => "recyclable",
            WasteCategory::Organic => "organic",
            WasteCategory::Hazardous => "hazardous",
        };
        write!(formatter, "{slug}")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Fill state of a bin.
pub enum BinStatus {
    /// Below 25%.
    #[default]
    Empty,
    /// 25% up to 75%.
    Partial,
    /// 75% up to 90%.
    Full,
    /// 90% and above.
    Overflowing,
    /// Manually taken out of service.
    Maintenance,
}

impl BinStatus {
    /// Ordinal rank of fill-derived statuses; `None` for [`BinStatus::Maintenance`].
    #[must_use]
    pub fn fill_rank(self) -> Option<u8> {
        match self {
            BinStatus::Empty => Some(0),
            BinStatus::Partial => Some(1),
            BinStatus::Full => Some(2),
            BinStatus::Overflowing => Some(3),
            BinStatus::Maintenance => None,
        }
    }
}

impl fmt::Display for BinStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            BinStatus::Empty => "empty",
            BinStatus::Partial => "partial",
            BinStatus::Full => "full",
            BinStatus::Overflowing => "overflowing",
            BinStatus::Maintenance => "maintenance",
        };
        write!(formatter, "{slug}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Where a bin stands.
pub struct BinLocation {
    /// Short display name, e.g. "Market Square North".
    pub name: String,
    /// Street address.
    pub address: Option<String>,
    /// Nearby landmark that helps residents find the bin.
    pub landmark: Option<String>,
    /// Geographic coordinate.
    pub coordinates: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Immutable maintenance history entry.
pub struct MaintenanceEntry {
    /// When the work was performed.
    pub date: DateTime<Utc>,
    /// Kind of work, e.g. "repair" or "cleaning".
    pub kind: String,
    /// Free-form description.
    pub description: String,
    /// User who performed the work.
    pub performed_by: UserId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Materialized counters of a bin.
pub struct BinStats {
    /// Number of completed collections.
    pub total_collections: u32,
    /// Mean fill level observed at completed collections.
    pub average_fill_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A deployed waste receptacle.
pub struct Bin {
    /// Internal identifier.
    pub id: BinId,
    /// Stable external code printed on the bin.
    pub code: String,
    /// Unique payload encoded on the bin's QR label.
    pub scan_token: String,
    /// Where the bin stands.
    pub location: BinLocation,
    /// Accepted waste stream.
    pub category: WasteCategory,
    /// Nominal full-scale level, 1..=100.
    pub capacity_percent: u8,
    /// Current fill level, 0..=100.
    pub fill_level: u8,
    /// Status derived from the fill level, or the maintenance override.
    pub status: BinStatus,
    /// Days between regular collections.
    pub collection_frequency_days: u32,
    /// Completion time of the last collection.
    pub last_collected_at: Option<DateTime<Utc>>,
    /// Last fill or status change.
    pub last_updated_at: DateTime<Utc>,
    /// Collector responsible for the bin.
    pub assigned_collector: Option<UserId>,
    /// Whether the bin is visible and operable.
    pub active: bool,
    /// Materialized counters.
    pub stats: BinStats,
    /// Maintenance log, oldest first.
    pub maintenance_history: Vec<MaintenanceEntry>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Input for registering a bin.
pub struct NewBin {
    /// Where the bin stands.
    pub location: BinLocation,
    /// Accepted waste stream; general when omitted.
    pub category: Option<WasteCategory>,
    /// Full-scale level; 100 when omitted.
    pub capacity_percent: Option<u8>,
    /// Collection cadence; seven days when omitted.
    pub collection_frequency_days: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Partial location change merged into the existing location.
pub struct LocationPatch {
    /// New display name.
    pub name: Option<String>,
    /// New street address.
    pub address: Option<String>,
    /// New landmark.
    pub landmark: Option<String>,
    /// New coordinate.
    pub coordinates: Option<GeoPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Administrative edit of a bin; absent fields stay unchanged.
pub struct BinUpdate {
    /// Location fields to merge.
    pub location: Option<LocationPatch>,
    /// New waste stream.
    pub category: Option<WasteCategory>,
    /// New full-scale level.
    pub capacity_percent: Option<u8>,
    /// New collection cadence.
    pub collection_frequency_days: Option<u32>,
    /// Activate or deactivate the bin.
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Filter for bin listings; absent fields match everything.
pub struct BinFilter {
    /// Only bins in this status.
    pub status: Option<BinStatus>,
    /// Only bins of this category.
    pub category: Option<WasteCategory>,
    /// Only bins assigned to this collector.
    pub collector: Option<UserId>,
    /// Only active (or inactive) bins.
    pub active: Option<bool>,
}

impl BinFilter {
    /// Filter selecting every active bin.
    #[must_use]
    pub fn active_only() -> Self {
        Self {
            active: Some(true),
            ..Self::default()
        }
    }

    /// Whether `bin` passes this filter.
    #[must_use]
    pub fn matches(&self, bin: &Bin) -> bool {
        self.status.is_none_or(|status| bin.status == status)
            && self.category.is_none_or(|category| bin.category == category)
            && self
                .collector
                .as_ref()
                .is_none_or(|collector| bin.assigned_collector.as_ref() == Some(collector))
            && self.active.is_none_or(|active| bin.active == active)
    }
}
