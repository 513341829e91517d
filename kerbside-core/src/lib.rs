//! Core types, workflows, and service wiring for the kerbside waste-collection coordinator.

/// Role capabilities and ownership checks.
pub mod access;
/// Bundle of adapters the service runs against.
pub mod backend;
/// Bin fill tracking and status derivation.
pub mod bins;
/// Pickup lifecycle, ratings, and the completion commit.
pub mod collections;
/// Error taxonomy.
pub mod error;
/// Domain events and their delivery.
pub mod events;
/// Per-kilogram rates and bulk fees.
pub mod fees;
/// Great-circle distances and proximity search.
pub mod geo;
/// Domain models and identifiers.
pub mod model;
/// Ledger commits, subscriptions, and refunds.
pub mod payments;
/// Traits describing persistence, payments, events, and time.
pub mod ports;
/// Route planning, driving, and progress.
pub mod routes;
/// High-level service facade used by clients.
pub mod service;
/// Administrative aggregates.
pub mod stats;
/// Input validation.
pub mod validate;

mod numeric;

pub use backend::Backend;
pub use error::{CoreError, ErrorKind, Result};
pub use events::{Audience, DomainEvent, EventDispatcher, Outcome, TracingSink};
pub use model::*;
pub use ports::*;
pub use service::{KerbsideService, PaymentConfirmation, Subscription};
