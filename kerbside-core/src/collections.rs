//! Collection requests, the collector state machine, ratings, and the completion commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::{self, Capability};
use crate::bins;
use crate::error::{CoreError, Result};
use crate::fees;
use crate::model::{
    Bin, Collection, CollectionId, CollectionKind, CollectionPayment, CollectionRequest,
    CollectionStatus, CollectionUpdate, PaymentStatus, Principal, Route, UserId, UserProfile,
    WasteComposition,
};
use crate::numeric::mean;
use crate::routes;

/// Create a pickup for `bin` on behalf of `requester`.
///
/// The collector is copied from the bin; bulk pickups carry a pending payment.
///
/// # Errors
///
/// Returns [`CoreError::Forbidden`] for bulk pickups without an active premium
/// subscription and [`CoreError::InvalidState`] when nobody collects the bin.
pub fn request(
    bin: &Bin,
    requester: &Principal,
    request: CollectionRequest,
    now: DateTime<Utc>,
) -> Result<Collection> {
    requester.require(Capability::RequestCollection)?;
    if request.kind == CollectionKind::Bulk && !requester.can(Capability::RequestBulkCollection)
    {
        return Err(CoreError::forbidden(
            "bulk collection is only available for premium users",
        ));
    }
    let Some(collector) = bin.assigned_collector.clone() else {
        return Err(CoreError::invalid_state(format!(
            "bin {} has no assigned collector",
            bin.id
        )));
    };

    let payment = (request.kind == CollectionKind::Bulk).then(|| CollectionPayment {
        amount: fees::bulk_fee(&request.composition),
        status: PaymentStatus::Pending,
        transaction_id: None,
    });

    Ok(Collection {
        id: CollectionId::generate(),
        bin: bin.id.clone(),
        collector,
        resident: Some(requester.id.clone()),
        kind: request.kind,
        status: CollectionStatus::Assigned,
        scheduled_at: request.scheduled_at.unwrap_or(now),
        completed_at: None,
        fill_level_before: None,
        fill_level_after: 0,
        composition: request.composition,
        notes: request.notes,
        rating: None,
        feedback: None,
        route: None,
        payment,
        created_at: now,
    })
}

/// Scheduled pickup of one stop of `route`, assigned to the route's collector.
#[must_use]
pub fn for_route_stop(route: &Route, bin: &Bin, now: DateTime<Utc>) -> Collection {
    Collection {
        id: CollectionId::generate(),
        bin: bin.id.clone(),
        collector: route.collector.clone(),
        resident: None,
        kind: CollectionKind::Scheduled,
        status: CollectionStatus::Assigned,
        scheduled_at: route.scheduled_at,
        completed_at: None,
        fill_level_before: None,
        fill_level_after: 0,
        composition: WasteComposition::default(),
        notes: None,
        rating: None,
        feedback: None,
        route: Some(route.id.clone()),
        payment: None,
        created_at: now,
    }
}

/// Move `collection` to the update's status and record the fields sent with it.
///
/// This touches the collection only; the other halves of a completion live in
/// [`CompletionCommit::apply`].
///
/// # Errors
///
/// Returns [`CoreError::Forbidden`] unless `collector` owns the pickup and
/// [`CoreError::InvalidState`] for a transition the state machine forbids.
pub fn advance(
    collection: &mut Collection,
    collector: &UserId,
    update: &CollectionUpdate,
    now: DateTime<Utc>,
) -> Result<()> {
    access::require_owner(collector, &collection.collector, "collection")?;
    if !collection.status.can_transition_to(update.status) {
        return Err(CoreError::invalid_state(format!(
            "collection {} cannot move from {} to {}",
            collection.id, collection.status, update.status
        )));
    }

    collection.status = update.status;
    if let Some(composition) = update.composition {
        collection.composition = composition;
    }
    if update.notes.is_some() {
        collection.notes.clone_from(&update.notes);
    }
    if let Some(level) = update.fill_level_after {
        collection.fill_level_after = level;
    }
    if update.status == CollectionStatus::Completed {
        collection.completed_at = Some(now);
    }
    Ok(())
}

/// Record the requesting resident's rating, replacing any earlier one.
///
/// # Errors
///
/// Returns [`CoreError::Forbidden`] for anyone but the requesting resident and
/// [`CoreError::InvalidState`] unless the pickup is completed.
pub fn rate(
    collection: &mut Collection,
    resident: &UserId,
    stars: u8,
    feedback: Option<String>,
) -> Result<()> {
    let owner = collection.resident.as_ref().ok_or_else(|| {
        CoreError::forbidden("only the requesting resident can rate a collection")
    })?;
    access::require_owner(resident, owner, "collection")?;
    if collection.status != CollectionStatus::Completed {
        return Err(CoreError::invalid_state(format!(
            "collection {} is {}, only completed collections can be rated",
            collection.id, collection.status
        )));
    }
    collection.rating = Some(stars);
    collection.feedback = feedback;
    Ok(())
}

/// Mean rating over the completed, rated pickups in `collections`.
#[must_use]
pub fn average_rating(collections: &[Collection]) -> Option<f64> {
    mean(
        collections
            .iter()
            .filter(|collection| collection.status == CollectionStatus::Completed)
            .filter_map(|collection| collection.rating)
            .map(f64::from),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A rating plus the collector's refreshed average, applied by the store as one unit.
pub struct RatingCommit {
    /// Collection being rated.
    pub collection: CollectionId,
    /// Resident giving the rating.
    pub resident: UserId,
    /// One to five stars.
    pub stars: u8,
    /// Optional comment.
    pub feedback: Option<String>,
}

impl RatingCommit {
    /// Rate `collection` and recompute its collector's average.
    ///
    /// `history` holds the collector's collections as currently stored; the
    /// rated collection replaces its own stored copy in the average.
    ///
    /// # Errors
    ///
    /// Any error of [`rate`], or [`CoreError::NotFound`] when the collector is
    /// missing from the directory.
    pub fn apply(
        &self,
        collection: &mut Collection,
        history: &[Collection],
        collector: Option<&mut UserProfile>,
    ) -> Result<()> {
        rate(collection, &self.resident, self.stars, self.feedback.clone())?;
        let profile = collector.ok_or_else(|| CoreError::not_found("user", &collection.collector))?;
        let mut rated: Vec<Collection> = history
            .iter()
            .filter(|other| other.id != collection.id)
            .cloned()
            .collect();
        rated.push(collection.clone());
        profile.stats.average_rating = average_rating(&rated);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Every state change of one completion, applied by the store as a single unit.
pub struct CompletionCommit {
    /// Collection being completed.
    pub collection: CollectionId,
    /// Status the caller observed; a different stored status is a conflict.
    pub expected_status: CollectionStatus,
    /// Fields reported with the completion.
    pub update: CollectionUpdate,
    /// Collector reporting the completion.
    pub collector: UserId,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
}

impl CompletionCommit {
    /// Apply the commit to current copies of the entities it touches.
    ///
    /// The store passes the persisted collection plus, when they still exist, its
    /// bin, its collector's profile, and its route, then writes them all back only
    /// if this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] when the collection moved on since the
    /// caller read it, or any error of [`advance`].
    pub fn apply(
        &self,
        collection: &mut Collection,
        bin: Option<&mut Bin>,
        collector: Option<&mut UserProfile>,
        route: Option<&mut Route>,
    ) -> Result<()> {
        if collection.status != self.expected_status {
            return Err(CoreError::Conflict(format!(
                "collection {} changed from {} to {}",
                collection.id, self.expected_status, collection.status
            )));
        }
        advance(collection, &self.collector, &self.update, self.completed_at)?;

        if let Some(bin) = bin {
            let before =
                bins::record_collection(bin, collection.fill_level_after, self.completed_at);
            collection.fill_level_before = Some(before);
        }
        if let Some(profile) = collector {
            profile.stats.total_collections = profile.stats.total_collections.saturating_add(1);
        }
        if let Some(route) = route {
            routes::record_completed_bin(route, &collection.bin);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Entities as written by a completion commit.
pub struct CompletionReceipt {
    /// The completed collection.
    pub collection: Collection,
    /// Its bin after the commit.
    pub bin: Option<Bin>,
    /// Its route after the commit.
    pub route: Option<Route>,
}
