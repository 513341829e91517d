//! Collections: single pickups, their waste payload, and status progression.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BinId, CollectionId, PaymentStatus, RouteId, UserId, WasteCategory};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Why a pickup happens.
pub enum CollectionKind {
    /// Regular cadence pickup.
    #[default]
    Scheduled,
    /// Requested by a resident.
    Requested,
    /// Urgent pickup, e.g. an overflowing bin.
    Emergency,
    /// Fee-bearing oversized pickup for premium residents.
    Bulk,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            CollectionKind::Scheduled => "scheduled",
            CollectionKind::Requested => "requested",
            CollectionKind::Emergency => "emergency",
            CollectionKind::Bulk => "bulk",
        };
        write!(formatter, "{slug}")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Progress of a collection.
pub enum CollectionStatus {
    /// Waiting for the collector.
    #[default]
    Assigned,
    /// Collector is on the way or at the bin.
    InProgress,
    /// Pickup done.
    Completed,
    /// Pickup called off.
    Cancelled,
}

impl CollectionStatus {
    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: CollectionStatus) -> bool {
        matches!(
            (self, next),
            (CollectionStatus::Assigned, CollectionStatus::InProgress)
                | (
                    CollectionStatus::Assigned | CollectionStatus::InProgress,
                    CollectionStatus::Completed | CollectionStatus::Cancelled
                )
        )
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CollectionStatus::Completed | CollectionStatus::Cancelled
        )
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            CollectionStatus::Assigned => "assigned",
            CollectionStatus::InProgress => "in_progress",
            CollectionStatus::Completed => "completed",
            CollectionStatus::Cancelled => "cancelled",
        };
        write!(formatter, "{slug}")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
/// Measured amount of one waste category.
pub struct WasteAmount {
    /// Weight in kilograms.
    pub weight: Option<f64>,
    /// Volume in litres.
    pub volume: Option<f64>,
}

impl WasteAmount {
    /// Amount with only a weight.
    #[must_use]
    pub const fn weighing(weight: f64) -> Self {
        Self {
            weight: Some(weight),
            volume: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
/// Per-category breakdown of a pickup.
pub struct WasteComposition {
    /// General waste.
    pub general: Option<WasteAmount>,
    /// Recyclables.
    pub recyclable: Option<WasteAmount>,
    /// Organic waste.
    pub organic: Option<WasteAmount>,
    /// Hazardous waste.
    pub hazardous: Option<WasteAmount>,
}

impl WasteComposition {
    /// Amount recorded for `category`, if any.
    #[must_use]
    pub fn amount(&self, category: WasteCategory) -> Option<&WasteAmount> {
        match category {
            WasteCategory::General => self.general.as_ref(),
            WasteCategory::Recyclable => self.recyclable.as_ref(),
            WasteCategory::Organic => self.organic.as_ref(),
            WasteCategory::Hazardous => self.hazardous.as_ref(),
        }
    }

    /// Weight of `category`, 0 when absent.
    #[must_use]
    pub fn weight_of(&self, category: WasteCategory) -> f64 {
        self.amount(category)
            .and_then(|amount| amount.weight)
            .unwrap_or(0.0)
    }

    /// Volume of `category`, 0 when absent.
    #[must_use]
    pub fn volume_of(&self, category: WasteCategory) -> f64 {
        self.amount(category)
            .and_then(|amount| amount.volume)
            .unwrap_or(0.0)
    }

    /// Sum of all category weights.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        WasteCategory::ALL
            .iter()
            .map(|category| self.weight_of(*category))
            .sum()
    }

    /// Sum of all category volumes.
    #[must_use]
    pub fn total_volume(&self) -> f64 {
        WasteCategory::ALL
            .iter()
            .map(|category| self.volume_of(*category))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Payment sub-record of a fee-bearing collection.
pub struct CollectionPayment {
    /// Amount due.
    pub amount: f64,
    /// Gateway status.
    pub status: PaymentStatus,
    /// Gateway transaction id once known.
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One pickup event or request.
pub struct Collection {
    /// Identifier.
    pub id: CollectionId,
    /// Bin to empty.
    pub bin: BinId,
    /// Collector doing the pickup.
    pub collector: UserId,
    /// Resident who asked for it, if resident-originated.
    pub resident: Option<UserId>,
    /// Why the pickup happens.
    pub kind: CollectionKind,
    /// Current status.
    pub status: CollectionStatus,
    /// Planned time.
    pub scheduled_at: DateTime<Utc>,
    /// Set iff `status` is completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Bin fill level observed at completion.
    pub fill_level_before: Option<u8>,
    /// Level the bin drops to once completed.
    pub fill_level_after: u8,
    /// Measured waste payload.
    pub composition: WasteComposition,
    /// Collector or resident notes.
    pub notes: Option<String>,
    /// Resident rating, 1..=5.
    pub rating: Option<u8>,
    /// Resident feedback accompanying the rating.
    pub feedback: Option<String>,
    /// Owning route, if the pickup belongs to one.
    pub route: Option<RouteId>,
    /// Payment for fee-bearing kinds.
    pub payment: Option<CollectionPayment>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Collection {
    /// Total weight of the recorded payload.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.composition.total_weight()
    }

    /// Total volume of the recorded payload.
    #[must_use]
    pub fn total_volume(&self) -> f64 {
        self.composition.total_volume()
    }

    /// Whether the pickup is still waiting past its scheduled time.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == CollectionStatus::Assigned && now > self.scheduled_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Input for requesting a pickup.
pub struct CollectionRequest {
    /// Bin to empty.
    pub bin: BinId,
    /// Why the pickup is needed.
    pub kind: CollectionKind,
    /// Desired time; now when omitted.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Expected payload, used for bulk fees.
    pub composition: WasteComposition,
    /// Notes for the collector.
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Status change reported by a collector, plus the fields recorded with it.
pub struct CollectionUpdate {
    /// Target status.
    pub status: CollectionStatus,
    /// Measured payload.
    pub composition: Option<WasteComposition>,
    /// Collector notes.
    pub notes: Option<String>,
    /// Level the bin drops to when completed; 0 when omitted.
    pub fill_level_after: Option<u8>,
}

impl CollectionUpdate {
    /// Bare status change without extra fields.
    #[must_use]
    pub fn to(status: CollectionStatus) -> Self {
        Self {
            status,
            composition: None,
            notes: None,
            fill_level_after: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Filter for collection listings; absent fields match everything.
pub struct CollectionFilter {
    /// Only pickups by this collector.
    pub collector: Option<UserId>,
    /// Only pickups requested by this resident.
    pub resident: Option<UserId>,
    /// Only pickups of this bin.
    pub bin: Option<BinId>,
    /// Only pickups on this route.
    pub route: Option<RouteId>,
    /// Only pickups in this status.
    pub status: Option<CollectionStatus>,
    /// Only pickups of this kind.
    pub kind: Option<CollectionKind>,
    /// Only rated pickups.
    pub rated_only: bool,
}

impl CollectionFilter {
    /// Whether `collection` passes this filter.
    #[must_use]
    pub fn matches(&self, collection: &Collection) -> bool {
        self.collector
            .as_ref()
            .is_none_or(|collector| &collection.collector == collector)
            && self
                .resident
                .as_ref()
                .is_none_or(|resident| collection.resident.as_ref() == Some(resident))
            && self.bin.as_ref().is_none_or(|bin| &collection.bin == bin)
            && self
                .route
                .as_ref()
                .is_none_or(|route| collection.route.as_ref() == Some(route))
            && self.status.is_none_or(|status| collection.status == status)
            && self.kind.is_none_or(|kind| collection.kind == kind)
            && (!self.rated_only || collection.rating.is_some())
    }
}
