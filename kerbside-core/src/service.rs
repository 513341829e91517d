//! High-level service facade combining the workflows with the configured adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::error::{CoreError, Result};
use crate::events::{EventDispatcher, Outcome};
use crate::model::{
    Bin, BinId, Collection, CollectionId, Payment, Principal, Route, RouteId, UserId, UserProfile,
};

mod bin_api;
mod collection_api;
mod payment_api;
mod report_api;
mod route_api;

/// Public entry point for every kerbside operation.
///
/// Each operation is one atomic unit against the backend. Operations that emit
/// events hand them to the dispatcher before returning, and also return them in
/// their [`Outcome`].
#[derive(Clone)]
pub struct KerbsideService {
    backend: Backend,
    events: EventDispatcher,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A settled bulk-collection payment.
pub struct PaymentConfirmation {
    /// The collection with its payment sub-record updated.
    pub collection: Collection,
    /// The ledger record written for it.
    pub payment: Payment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A purchased premium term.
pub struct Subscription {
    /// The ledger record written for it.
    pub payment: Payment,
    /// The subscriber's profile after the upgrade.
    pub profile: UserProfile,
}

impl KerbsideService {
    /// Create a service over `backend`, delivering events through `events`.
    #[must_use]
    pub fn new(backend: Backend, events: EventDispatcher) -> Self {
        Self { backend, events }
    }

    /// The adapters this service runs against.
    #[must_use]
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    fn now(&self) -> DateTime<Utc> {
        self.backend.clock.now()
    }

    fn publish<T>(&self, outcome: Outcome<T>) -> Outcome<T> {
        self.events.dispatch(outcome.events.clone());
        outcome
    }

    async fn bin(&self, id: &BinId) -> Result<Bin> {
        self.backend
            .bins
            .find_bin(id)
            .await?
            .ok_or_else(|| CoreError::not_found("bin", id))
    }

    async fn collection(&self, id: &CollectionId) -> Result<Collection> {
        self.backend
            .collections
            .find_collection(id)
            .await?
            .ok_or_else(|| CoreError::not_found("collection", id))
    }

    async fn route(&self, id: &RouteId) -> Result<Route> {
        self.backend
            .routes
            .find_route(id)
            .await?
            .ok_or_else(|| CoreError::not_found("route", id))
    }

    async fn user(&self, id: &UserId) -> Result<UserProfile> {
        self.backend
            .users
            .find_user(id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", id))
    }

    /// Principal of a directory user at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown user and
    /// [`CoreError::Forbidden`] for a deactivated account.
    pub async fn principal(&self, id: &UserId) -> Result<Principal> {
        let profile = self.user(id).await?;
        if !profile.active {
            return Err(CoreError::forbidden(format!("account {id} is deactivated")));
        }
        Ok(profile.principal(self.now()))
    }
}
