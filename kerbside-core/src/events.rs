//! Domain events emitted by operations and their best-effort delivery.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::{
    BinId, BinStatus, CollectionId, CollectionKind, CollectionStatus, RouteId, UserId,
};
use crate::ports::EventSink;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Who an event is meant for.
pub enum Audience {
    /// One collector's private channel.
    Collector(UserId),
    /// Everyone watching bins.
    Bins,
    /// Everyone watching collections.
    Collections,
    /// Operators.
    Admin,
}

impl Audience {
    /// Channel name used by push transports.
    #[must_use]
    pub fn channel(&self) -> String {
        match self {
            Audience::Collector(id) => format!("collector-{id}"),
            Audience::Bins => "bins".to_owned(),
            Audience::Collections => "collections".to_owned(),
            Audience::Admin => "admin".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
/// Something that happened and that listeners may want to hear about.
pub enum DomainEvent {
    /// A pickup was requested from a collector.
    NewCollectionRequest {
        /// New collection.
        collection_id: CollectionId,
        /// Collector who has to do it.
        collector: UserId,
        /// Display name of the bin.
        bin_name: String,
        /// Kind of pickup.
        kind: CollectionKind,
        /// Planned time.
        scheduled_at: DateTime<Utc>,
    },
    /// A bin's fill level or status changed.
    BinUpdated {
        /// Bin.
        bin_id: BinId,
        /// New level.
        fill_level: u8,
        /// New status.
        status: BinStatus,
    },
    /// A collection changed status.
    CollectionUpdated {
        /// Collection.
        collection_id: CollectionId,
        /// New status.
        status: CollectionStatus,
        /// Completion time, if completed.
        completed_at: Option<DateTime<Utc>>,
    },
    /// A collector started a route.
    RouteStarted {
        /// Route.
        route_id: RouteId,
        /// Collector driving it.
        collector: UserId,
        /// Start time.
        started_at: DateTime<Utc>,
    },
    /// A collector finished a route.
    RouteCompleted {
        /// Route.
        route_id: RouteId,
        /// End time.
        ended_at: DateTime<Utc>,
        /// Measured duration.
        actual_duration_min: Option<u32>,
    },
}

impl DomainEvent {
    /// Who should receive the event.
    #[must_use]
    pub fn audience(&self) -> Audience {
        match self {
            DomainEvent::NewCollectionRequest { collector, .. }
            | DomainEvent::RouteStarted { collector, .. } => Audience::Collector(collector.clone()),
            DomainEvent::BinUpdated { .. } => Audience::Bins,
            DomainEvent::CollectionUpdated { .. } => Audience::Collections,
            DomainEvent::RouteCompleted { .. } => Audience::Admin,
        }
    }

    /// Event name as it appears on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::NewCollectionRequest { .. } => "newCollectionRequest",
            DomainEvent::BinUpdated { .. } => "binUpdated",
            DomainEvent::CollectionUpdated { .. } => "collectionUpdated",
            DomainEvent::RouteStarted { .. } => "routeStarted",
            DomainEvent::RouteCompleted { .. } => "routeCompleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Result of an operation plus the events it wants emitted.
pub struct Outcome<T> {
    /// Operation result.
    pub value: T,
    /// Events to hand to an [`EventDispatcher`].
    pub events: Vec<DomainEvent>,
}

impl<T> Outcome<T> {
    /// Result with events.
    #[must_use]
    pub fn with(value: T, events: Vec<DomainEvent>) -> Self {
        Self { value, events }
    }
}

/// Fan-out of events to every registered sink; failures are logged, never returned.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventDispatcher {
    /// Dispatcher delivering to `sinks`.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Deliver `events` in the background on the current Tokio runtime.
    ///
    /// Without a runtime the events are dropped with a warning.
    pub fn dispatch(&self, events: Vec<DomainEvent>) {
        if events.is_empty() || self.sinks.is_empty() {
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                let dispatcher = self.clone();
                handle.spawn(async move { dispatcher.deliver(&events).await });
            }
            Err(err) => warn!(%err, dropped = events.len(), "no runtime for event delivery"),
        }
    }

    /// Deliver `events` to every sink and wait for completion.
    pub async fn deliver(&self, events: &[DomainEvent]) {
        for event in events {
            for sink in &self.sinks {
                match sink.publish(event).await {
                    Ok(()) => debug!(sink = sink.name(), event = event.name(), "event delivered"),
                    Err(err) => warn!(
                        sink = sink.name(),
                        event = event.name(),
                        %err,
                        "event delivery failed"
                    ),
                }
            }
        }
    }
}

/// Sink writing every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        info!(
            event = event.name(),
            channel = %event.audience().channel(),
            "{event:?}"
        );
        Ok(())
    }
}
