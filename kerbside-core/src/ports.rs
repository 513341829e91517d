//! Traits describing the collaborators the core depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::bins::DisposalCommit;
use crate::collections::{CompletionCommit, CompletionReceipt, RatingCommit};
use crate::error::Result;
use crate::events::DomainEvent;
use crate::model::{
    Bin, BinFilter, BinId, Collection, CollectionFilter, CollectionId, GatewayReceipt, Payment,
    PaymentId, Route, RouteFilter, RouteId, UserId, UserProfile,
};
use crate::payments::{PaymentCommit, PaymentReceipt};
use crate::routes::RouteCompletion;

/// In-place change applied to the current stored value inside the store's critical section.
///
/// Returning an error leaves the stored value untouched.
pub type Mutation<'a, T> = dyn Fn(&mut T) -> Result<()> + Send + Sync + 'a;

#[async_trait]
/// Persistence of bins.
pub trait BinRepository: Send + Sync {
    /// Store a new bin.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Conflict`] for a duplicate id or code, or
    /// [`crate::CoreError::Unavailable`] when the store is unreachable.
    async fn insert_bin(&self, bin: Bin) -> Result<Bin>;

    /// Look up a bin by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when the store is unreachable.
    async fn find_bin(&self, id: &BinId) -> Result<Option<Bin>>;

    /// All bins passing `filter`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when the store is unreachable.
    async fn list_bins(&self, filter: &BinFilter) -> Result<Vec<Bin>>;

    /// Apply `mutation` to the stored bin and return the new value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] for an unknown id, or the mutation's error.
    async fn update_bin(&self, id: &BinId, mutation: &Mutation<'_, Bin>) -> Result<Bin>;

    /// Apply a disposal to the bin and the disposing resident's profile as one
    /// unit: either both are written or neither is.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] for an unknown bin, or any error of
    /// [`DisposalCommit::apply`].
    async fn commit_disposal(&self, commit: &DisposalCommit) -> Result<Bin>;
}

#[async_trait]
/// Persistence of collections, including the multi-entity completion commit.
pub trait CollectionRepository: Send + Sync {
    /// Store a new collection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Conflict`] for a duplicate id.
    async fn insert_collection(&self, collection: Collection) -> Result<Collection>;

    /// Look up a collection by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when the store is unreachable.
    async fn find_collection(&self, id: &CollectionId) -> Result<Option<Collection>>;

    /// All collections passing `filter`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when the store is unreachable.
    async fn list_collections(&self, filter: &CollectionFilter) -> Result<Vec<Collection>>;

    /// Apply `mutation` to the stored collection and return the new value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] for an unknown id, or the mutation's error.
    async fn update_collection(
        &self,
        id: &CollectionId,
        mutation: &Mutation<'_, Collection>,
    ) -> Result<Collection>;

    /// Apply a completion to the collection, its bin, its collector, and its route
    /// as one unit: either every entity is written or none is.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] for an unknown collection,
    /// [`crate::CoreError::Conflict`] when its status moved on, or any error of
    /// [`CompletionCommit::apply`].
    async fn commit_completion(&self, commit: &CompletionCommit) -> Result<CompletionReceipt>;

    /// Store a rating and the collector's recomputed average as one unit.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] for an unknown collection, or any
    /// error of [`RatingCommit::apply`].
    async fn commit_rating(&self, commit: &RatingCommit) -> Result<Collection>;
}

#[async_trait]
/// Persistence of routes.
pub trait RouteRepository: Send + Sync {
    /// Store a new route.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Conflict`] for a duplicate id.
    async fn insert_route(&self, route: Route) -> Result<Route>;

    /// Look up a route by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when the store is unreachable.
    async fn find_route(&self, id: &RouteId) -> Result<Option<Route>>;

    /// All routes passing `filter`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when the store is unreachable.
    async fn list_routes(&self, filter: &RouteFilter) -> Result<Vec<Route>>;

    /// Apply `mutation` to the stored route and return the new value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] for an unknown id, or the mutation's error.
    async fn update_route(&self, id: &RouteId, mutation: &Mutation<'_, Route>) -> Result<Route>;

    /// Finish a route against the collections referencing it, read in the same
    /// unit as the route is written.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] for an unknown route, or any error of
    /// [`RouteCompletion::apply`].
    async fn commit_route_completion(&self, commit: &RouteCompletion) -> Result<Route>;
}

#[async_trait]
/// Directory of user profiles owned by the identity collaborator.
pub trait UserDirectory: Send + Sync {
    /// Look up a profile by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when the directory is unreachable.
    async fn find_user(&self, id: &UserId) -> Result<Option<UserProfile>>;

    /// Every profile, in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when the directory is unreachable.
    async fn list_users(&self) -> Result<Vec<UserProfile>>;

    /// Apply `mutation` to the stored profile and return the new value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] for an unknown id, or the mutation's error.
    async fn update_user(
        &self,
        id: &UserId,
        mutation: &Mutation<'_, UserProfile>,
    ) -> Result<UserProfile>;
}

#[async_trait]
/// Ledger of payments; entries only change through refunds.
pub trait PaymentLedger: Send + Sync {
    /// Look up a ledger entry by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when the ledger is unreachable.
    async fn find_payment(&self, id: &PaymentId) -> Result<Option<Payment>>;

    /// Every recorded payment, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when the ledger is unreachable.
    async fn list_payments(&self) -> Result<Vec<Payment>>;

    /// Write a ledger entry together with the collection or user it affects, as
    /// one unit.
    ///
    /// # Errors
    ///
    /// Any error of [`PaymentCommit::entry`] or [`PaymentCommit::apply`].
    async fn commit_payment(&self, commit: &PaymentCommit) -> Result<PaymentReceipt>;
}

#[async_trait]
/// External payment processor.
pub trait PaymentGateway: Send + Sync {
    /// Open a payment intent for `amount` charged to `user`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when the processor cannot be reached.
    async fn create_intent(
        &self,
        user: &UserId,
        amount: f64,
        description: &str,
    ) -> Result<GatewayReceipt>;

    /// Confirm a previously created intent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when the processor cannot be reached.
    async fn confirm(&self, transaction_id: &str) -> Result<GatewayReceipt>;

    /// Refund `amount` of a settled transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when the processor cannot be reached.
    async fn refund(&self, transaction_id: &str, amount: f64) -> Result<GatewayReceipt>;
}

#[async_trait]
/// Destination of domain events, e.g. a push channel or webhook.
pub trait EventSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unavailable`] when delivery fails; callers log
    /// and drop the error.
    async fn publish(&self, event: &DomainEvent) -> Result<()>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
