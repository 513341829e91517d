//! In-memory adapters for kerbside: persistence, user directory, an offline
//! payment gateway, and a settable clock.
//!
//! Every write runs under one table lock, so each port call is a single atomic
//! unit and every commit touches all of its entities at once.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use kerbside_core::{
    Backend, Bin, BinFilter, BinId, BinRepository, Clock, Collection, CollectionFilter,
    CollectionId, CollectionRepository, CoreError, GatewayReceipt, Mutation, Payment,
    PaymentGateway, PaymentId, PaymentLedger, PaymentStatus, Result, Route, RouteFilter, RouteId,
    RouteRepository, UserDirectory, UserId, UserProfile,
    bins::DisposalCommit,
    collections::{CompletionCommit, CompletionReceipt, RatingCommit},
    payments::{PaymentCommit, PaymentReceipt},
    routes::RouteCompletion,
};

#[derive(Debug, Default)]
struct Tables {
    bins: IndexMap<BinId, Bin>,
    collections: IndexMap<CollectionId, Collection>,
    routes: IndexMap<RouteId, Route>,
    users: IndexMap<UserId, UserProfile>,
    payments: IndexMap<PaymentId, Payment>,
}

/// Apply `mutation` to a copy of the stored value and write it back only on success.
fn mutate<K, V>(
    table: &mut IndexMap<K, V>,
    entity: &'static str,
    id: &K,
    mutation: &Mutation<'_, V>,
) -> Result<V>
where
    K: Hash + Eq + fmt::Display,
    V: Clone,
{
    let stored = table
        .get_mut(id)
        .ok_or_else(|| CoreError::not_found(entity, id))?;
    let mut draft = stored.clone();
    mutation(&mut draft)?;
    stored.clone_from(&draft);
    Ok(draft)
}

/// Process-local store implementing every persistence port plus the user directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with the directory.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] when the id or email is taken.
    pub async fn add_user(&self, profile: UserProfile) -> Result<UserProfile> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&profile.id) {
            return Err(CoreError::Conflict(format!("user {} exists", profile.id)));
        }
        if tables
            .users
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&profile.email))
        {
            return Err(CoreError::Conflict(format!(
                "email {} is already registered",
                profile.email
            )));
        }
        tables.users.insert(profile.id.clone(), profile.clone());
        debug!(user = %profile.id, role = %profile.role, "user added");
        Ok(profile)
    }
}

#[async_trait]
impl BinRepository for MemoryStore {
    async fn insert_bin(&self, bin: Bin) -> Result<Bin> {
        let mut tables = self.tables.write().await;
        if tables.bins.contains_key(&bin.id) {
            return Err(CoreError::Conflict(format!("bin {} exists", bin.id)));
        }
        if tables.bins.values().any(|existing| existing.code == bin.code) {
            return Err(CoreError::Conflict(format!("bin code {} is taken", bin.code)));
        }
        tables.bins.insert(bin.id.clone(), bin.clone());
        Ok(bin)
    }

    async fn find_bin(&self, id: &BinId) -> Result<Option<Bin>> {
        Ok(self.tables.read().await.bins.get(id).cloned())
    }

    async fn list_bins(&self, filter: &BinFilter) -> Result<Vec<Bin>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bins
            .values()
            .filter(|bin| filter.matches(bin))
            .cloned()
            .collect())
    }

    async fn update_bin(&self, id: &BinId, mutation: &Mutation<'_, Bin>) -> Result<Bin> {
        let mut tables = self.tables.write().await;
        mutate(&mut tables.bins, "bin", id, mutation)
    }

    async fn commit_disposal(&self, commit: &DisposalCommit) -> Result<Bin> {
        let mut guard = self.tables.write().await;
        let Tables { bins, users, .. } = &mut *guard;

        let mut bin = bins
            .get(&commit.bin)
            .cloned()
            .ok_or_else(|| CoreError::not_found("bin", &commit.bin))?;
        let mut resident = commit
            .resident
            .as_ref()
            .and_then(|id| users.get(id))
            .cloned();

        commit.apply(&mut bin, resident.as_mut())?;

        if let Some(updated) = resident {
            users.insert(updated.id.clone(), updated);
        }
        bins.insert(bin.id.clone(), bin.clone());
        Ok(bin)
    }
}

#[async_trait]
impl CollectionRepository for MemoryStore {
    async fn insert_collection(&self, collection: Collection) -> Result<Collection> {
        let mut tables = self.tables.write().await;
        if tables.collections.contains_key(&collection.id) {
            return Err(CoreError::Conflict(format!(
                "collection {} exists",
                collection.id
            )));
        }
        tables
            .collections
            .insert(collection.id.clone(), collection.clone());
        Ok(collection)
    }

    async fn find_collection(&self, id: &CollectionId) -> Result<Option<Collection>> {
        Ok(self.tables.read().await.collections.get(id).cloned())
    }

    async fn list_collections(&self, filter: &CollectionFilter) -> Result<Vec<Collection>> {
        let tables = self.tables.read().await;
        Ok(tables
            .collections
            .values()
            .filter(|collection| filter.matches(collection))
            .cloned()
            .collect())
    }

    async fn update_collection(
        &self,
        id: &CollectionId,
        mutation: &Mutation<'_, Collection>,
    ) -> Result<Collection> {
        let mut tables = self.tables.write().await;
        mutate(&mut tables.collections, "collection", id, mutation)
    }

    async fn commit_completion(&self, commit: &CompletionCommit) -> Result<CompletionReceipt> {
        let mut guard = self.tables.write().await;
        let Tables {
            bins,
            collections,
            routes,
            users,
            ..
        } = &mut *guard;

        let mut collection = collections
            .get(&commit.collection)
            .cloned()
            .ok_or_else(|| CoreError::not_found("collection", &commit.collection))?;
        let mut bin = bins.get(&collection.bin).cloned();
        let mut collector = users.get(&collection.collector).cloned();
        let mut route = collection
            .route
            .as_ref()
            .and_then(|route_id| routes.get(route_id))
            .cloned();
        if bin.is_none() {
            warn!(
                collection = %collection.id,
                bin = %collection.bin,
                "completing against a missing bin"
            );
        }

        commit.apply(
            &mut collection,
            bin.as_mut(),
            collector.as_mut(),
            route.as_mut(),
        )?;

        if let Some(updated) = &bin {
            bins.insert(updated.id.clone(), updated.clone());
        }
        if let Some(updated) = collector {
            users.insert(updated.id.clone(), updated);
        }
        if let Some(updated) = &route {
            routes.insert(updated.id.clone(), updated.clone());
        }
        collections.insert(collection.id.clone(), collection.clone());
        debug!(collection = %collection.id, "completion committed");

        Ok(CompletionReceipt {
            collection,
            bin,
            route,
        })
    }

    async fn commit_rating(&self, commit: &RatingCommit) -> Result<Collection> {
        let mut guard = self.tables.write().await;
        let Tables {
            collections,
            users,
            ..
        } = &mut *guard;

        let mut collection = collections
            .get(&commit.collection)
            .cloned()
            .ok_or_else(|| CoreError::not_found("collection", &commit.collection))?;
        let history: Vec<Collection> = collections
            .values()
            .filter(|other| other.collector == collection.collector)
            .cloned()
            .collect();
        let mut collector = users.get(&collection.collector).cloned();

        commit.apply(&mut collection, &history, collector.as_mut())?;

        if let Some(updated) = collector {
            debug!(
                user = %updated.id,
                average = ?updated.stats.average_rating,
                "rating average refreshed"
            );
            users.insert(updated.id.clone(), updated);
        }
        collections.insert(collection.id.clone(), collection.clone());
        Ok(collection)
    }
}

#[async_trait]
impl RouteRepository for MemoryStore {
    async fn insert_route(&self, route: Route) -> Result<Route> {
        let mut tables = self.tables.write().await;
        if tables.routes.contains_key(&route.id) {
            return Err(CoreError::Conflict(format!("route {} exists", route.id)));
        }
        tables.routes.insert(route.id.clone(), route.clone());
        Ok(route)
    }

    async fn find_route(&self, id: &RouteId) -> Result<Option<Route>> {
        Ok(self.tables.read().await.routes.get(id).cloned())
    }

    async fn list_routes(&self, filter: &RouteFilter) -> Result<Vec<Route>> {
        let tables = self.tables.read().await;
        Ok(tables
            .routes
            .values()
            .filter(|route| filter.matches(route))
            .cloned()
            .collect())
    }

    async fn update_route(&self, id: &RouteId, mutation: &Mutation<'_, Route>) -> Result<Route> {
        let mut tables = self.tables.write().await;
        mutate(&mut tables.routes, "route", id, mutation)
    }

    async fn commit_route_completion(&self, commit: &RouteCompletion) -> Result<Route> {
        let mut guard = self.tables.write().await;
        let Tables {
            collections,
            routes,
            ..
        } = &mut *guard;

        let mut route = routes
            .get(&commit.route)
            .cloned()
            .ok_or_else(|| CoreError::not_found("route", &commit.route))?;
        let attached: Vec<Collection> = collections
            .values()
            .filter(|collection| collection.route.as_ref() == Some(&commit.route))
            .cloned()
            .collect();

        commit.apply(&mut route, &attached)?;

        routes.insert(route.id.clone(), route.clone());
        debug!(route = %route.id, collections = attached.len(), "route completion committed");
        Ok(route)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, id: &UserId) -> Result<Option<UserProfile>> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserProfile>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn update_user(
        &self,
        id: &UserId,
        mutation: &Mutation<'_, UserProfile>,
    ) -> Result<UserProfile> {
        let mut tables = self.tables.write().await;
        mutate(&mut tables.users, "user", id, mutation)
    }
}

#[async_trait]
impl PaymentLedger for MemoryStore {
    async fn find_payment(&self, id: &PaymentId) -> Result<Option<Payment>> {
        Ok(self.tables.read().await.payments.get(id).cloned())
    }

    async fn list_payments(&self) -> Result<Vec<Payment>> {
        Ok(self.tables.read().await.payments.values().cloned().collect())
    }

    async fn commit_payment(&self, commit: &PaymentCommit) -> Result<PaymentReceipt> {
        let mut guard = self.tables.write().await;
        let Tables {
            collections,
            users,
            payments,
            ..
        } = &mut *guard;

        let mut entry = commit.entry(payments.get(commit.payment_id()).cloned())?;
        let mut collection = entry
            .collection
            .as_ref()
            .and_then(|id| collections.get(id))
            .cloned();
        let mut payer = users.get(&entry.user).cloned();

        commit.apply(&mut entry, collection.as_mut(), payer.as_mut())?;

        if let Some(updated) = &collection {
            collections.insert(updated.id.clone(), updated.clone());
        }
        if let Some(updated) = &payer {
            users.insert(updated.id.clone(), updated.clone());
        }
        payments.insert(entry.id.clone(), entry.clone());
        debug!(
            payment = %entry.id,
            kind = ?entry.kind,
            status = ?entry.status,
            "payment committed"
        );

        Ok(PaymentReceipt {
            payment: entry,
            collection,
            payer,
        })
    }
}

/// Payment gateway that settles every intent locally, for demos and tests.
///
/// It can be switched offline to exercise failure paths.
#[derive(Debug)]
pub struct OfflinePaymentGateway {
    intents: RwLock<IndexMap<String, PaymentStatus>>,
    online: AtomicBool,
}

impl Default for OfflinePaymentGateway {
    fn default() -> Self {
        Self {
            intents: RwLock::default(),
            online: AtomicBool::new(true),
        }
    }
}

impl OfflinePaymentGateway {
    /// Gateway that accepts every payment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the processor becoming reachable or unreachable.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::Unavailable(
                "payment processor is unreachable".to_owned(),
            ))
        }
    }

    async fn transition(
        &self,
        transaction_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<GatewayReceipt> {
        self.ensure_online()?;
        let mut intents = self.intents.write().await;
        let status = intents.get_mut(transaction_id).ok_or_else(|| {
            CoreError::invalid_input(format!("unknown transaction {transaction_id}"))
        })?;
        if *status != from {
            return Err(CoreError::invalid_state(format!(
                "transaction {transaction_id} is {status:?}"
            )));
        }
        *status = to;
        Ok(GatewayReceipt {
            transaction_id: transaction_id.to_owned(),
            status: to,
        })
    }
}

#[async_trait]
impl PaymentGateway for OfflinePaymentGateway {
    async fn create_intent(
        &self,
        user: &UserId,
        amount: f64,
        description: &str,
    ) -> Result<GatewayReceipt> {
        self.ensure_online()?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(CoreError::invalid_input(format!(
                "cannot charge {amount}"
            )));
        }
        let transaction_id = format!("offline_{}", Uuid::new_v4().simple());
        self.intents
            .write()
            .await
            .insert(transaction_id.clone(), PaymentStatus::Pending);
        debug!(%user, amount, description, transaction = %transaction_id, "payment intent created");
        Ok(GatewayReceipt {
            transaction_id,
            status: PaymentStatus::Pending,
        })
    }

    async fn confirm(&self, transaction_id: &str) -> Result<GatewayReceipt> {
        self.transition(
            transaction_id,
            PaymentStatus::Pending,
            PaymentStatus::Completed,
        )
        .await
    }

    async fn refund(&self, transaction_id: &str, amount: f64) -> Result<GatewayReceipt> {
        debug!(transaction = %transaction_id, amount, "refunding");
        self.transition(
            transaction_id,
            PaymentStatus::Completed,
            PaymentStatus::Refunded,
        )
        .await
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wire a [`Backend`] whose persistence and directory all live in `store`.
#[must_use]
pub fn backend(
    store: &Arc<MemoryStore>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
) -> Backend {
    Backend {
        bins: Arc::<MemoryStore>::clone(store),
        collections: Arc::<MemoryStore>::clone(store),
        routes: Arc::<MemoryStore>::clone(store),
        users: Arc::<MemoryStore>::clone(store),
        payments: Arc::<MemoryStore>::clone(store),
        gateway,
        clock,
    }
}
