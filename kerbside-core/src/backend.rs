//! Bundle of adapters a [`crate::service::KerbsideService`] runs against.

use std::sync::Arc;

use crate::ports::{
    BinRepository, Clock, CollectionRepository, PaymentGateway, PaymentLedger, RouteRepository,
    UserDirectory,
};

/// Every collaborator the service needs, resolved once at startup.
#[derive(Clone)]
pub struct Backend {
    /// Bin persistence.
    pub bins: Arc<dyn BinRepository>,
    /// Collection persistence and completion commits.
    pub collections: Arc<dyn CollectionRepository>,
    /// Route persistence.
    pub routes: Arc<dyn RouteRepository>,
    /// User profiles.
    pub users: Arc<dyn UserDirectory>,
    /// Payment ledger.
    pub payments: Arc<dyn PaymentLedger>,
    /// External payment processor.
    pub gateway: Arc<dyn PaymentGateway>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}
