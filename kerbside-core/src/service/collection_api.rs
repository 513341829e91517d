use std::cmp::Reverse;

use tracing::{debug, info, warn};

use super::KerbsideService;
use crate::access::{self, Capability};
use crate::collections::{self, CompletionCommit, RatingCommit};
use crate::error::{CoreError, Result};
use crate::events::{DomainEvent, Outcome};
use crate::model::{
    Collection, CollectionFilter, CollectionId, CollectionRequest, CollectionStatus,
    CollectionUpdate, Page, PageRequest, Principal, Role,
};
use crate::validate;

fn collection_updated(collection: &Collection) -> DomainEvent {
    DomainEvent::CollectionUpdated {
        collection_id: collection.id.clone(),
        status: collection.status,
        completed_at: collection.completed_at,
    }
}

impl KerbsideService {
    /// Ask for a pickup of a bin.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a bad payload, [`CoreError::NotFound`]
    /// for an unknown bin, [`CoreError::Forbidden`] for bulk pickups without an active
    /// premium subscription, [`CoreError::InvalidState`] for a bin that is out of
    /// service or has no collector, or a store error.
    pub async fn request_collection(
        &self,
        actor: &Principal,
        request: CollectionRequest,
    ) -> Result<Outcome<Collection>> {
        validate::collection_request(&request)?;
        let bin = self.bin(&request.bin).await?;
        if !bin.active {
            return Err(CoreError::invalid_state(format!(
                "bin {} is not in service",
                bin.id
            )));
        }
        let collection = collections::request(&bin, actor, request, self.now())?;
        let collection = self
            .backend
            .collections
            .insert_collection(collection)
            .await?;
        info!(
            collection = %collection.id,
            bin = %bin.id,
            kind = %collection.kind,
            "collection requested"
        );

        let events = vec![DomainEvent::NewCollectionRequest {
            collection_id: collection.id.clone(),
            collector: collection.collector.clone(),
            bin_name: bin.location.name.clone(),
            kind: collection.kind,
            scheduled_at: collection.scheduled_at,
        }];
        Ok(self.publish(Outcome::with(collection, events)))
    }

    /// Look up one collection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown id, [`CoreError::Forbidden`]
    /// unless the actor is an admin, its collector, or its resident, or a store error.
    pub async fn get_collection(&self, actor: &Principal, id: &CollectionId) -> Result<Collection> {
        let collection = self.collection(id).await?;
        if !access::can_view_collection(actor, &collection) {
            return Err(CoreError::forbidden("access denied"));
        }
        Ok(collection)
    }

    /// Page through collections, newest first.
    ///
    /// Collectors see the pickups assigned to them and residents the ones they asked for.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a bad page, or a store error.
    pub async fn list_collections(
        &self,
        actor: &Principal,
        mut filter: CollectionFilter,
        page: PageRequest,
    ) -> Result<Page<Collection>> {
        validate::page(page)?;
        match actor.role {
            Role::Admin => {}
            Role::Collector => filter.collector = Some(actor.id.clone()),
            Role::Resident | Role::PremiumResident => filter.resident = Some(actor.id.clone()),
        }
        let mut found = self.backend.collections.list_collections(&filter).await?;
        found.sort_by_key(|collection| Reverse(collection.created_at));
        Ok(Page::paginate(found, page))
    }

    /// Move a collection through its states.
    ///
    /// Completing it also empties the bin, bumps bin and collector counters, and
    /// marks the bin serviced on its route, all in one commit.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] unless the actor is the assigned collector,
    /// [`CoreError::InvalidInput`] for bad fields, [`CoreError::InvalidState`] for a
    /// forbidden transition, [`CoreError::Conflict`] when the collection changed
    /// concurrently, [`CoreError::NotFound`] for an unknown id, or a store error.
    pub async fn advance_collection(
        &self,
        actor: &Principal,
        id: &CollectionId,
        update: CollectionUpdate,
    ) -> Result<Outcome<Collection>> {
        actor.require(Capability::AdvanceCollection)?;
        validate::collection_update(&update)?;
        let current = self.collection(id).await?;
        let now = self.now();
        // surface ownership and transition errors before touching anything
        collections::advance(&mut current.clone(), &actor.id, &update, now)?;

        if update.status != CollectionStatus::Completed {
            let collection = self
                .backend
                .collections
                .update_collection(id, &|collection| {
                    collections::advance(collection, &actor.id, &update, now)
                })
                .await?;
            debug!(collection = %collection.id, status = %collection.status, "collection advanced");
            let events = vec![collection_updated(&collection)];
            return Ok(self.publish(Outcome::with(collection, events)));
        }

        let commit = CompletionCommit {
            collection: id.clone(),
            expected_status: current.status,
            update,
            collector: actor.id.clone(),
            completed_at: now,
        };
        let receipt = self.backend.collections.commit_completion(&commit).await?;
        info!(
            collection = %receipt.collection.id,
            bin = %receipt.collection.bin,
            route = ?receipt.collection.route,
            "collection completed"
        );

        let mut events = vec![collection_updated(&receipt.collection)];
        if let Some(bin) = &receipt.bin {
            events.push(DomainEvent::BinUpdated {
                bin_id: bin.id.clone(),
                fill_level: bin.fill_level,
                status: bin.status,
            });
        } else {
            warn!(bin = %receipt.collection.bin, "completed collection references a missing bin");
        }
        Ok(self.publish(Outcome::with(receipt.collection, events)))
    }

    /// Rate a completed pickup and refresh the collector's average rating.
    ///
    /// The rating and the average are written together; a collector missing from
    /// the directory fails the operation and the rating is not stored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] outside one to five stars,
    /// [`CoreError::Forbidden`] unless the actor requested the pickup,
    /// [`CoreError::InvalidState`] unless it is completed, [`CoreError::NotFound`] for
    /// an unknown collection or collector, or a store error.
    pub async fn rate_collection(
        &self,
        actor: &Principal,
        id: &CollectionId,
        stars: u8,
        feedback: Option<String>,
    ) -> Result<Collection> {
        validate::rating(stars)?;
        let commit = RatingCommit {
            collection: id.clone(),
            resident: actor.id.clone(),
            stars,
            feedback,
        };
        let collection = self.backend.collections.commit_rating(&commit).await?;
        info!(
            collection = %collection.id,
            collector = %collection.collector,
            stars,
            "collection rated"
        );
        Ok(collection)
    }
}
