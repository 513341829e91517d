//! Event sink posting kerbside domain events to an HTTP webhook.
//!
//! Each event is sent as one JSON object carrying the push channel it is meant
//! for, the send time, and the event's own fields.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use kerbside_core::{CoreError, DomainEvent, EventSink, Result};

/// Failures while talking to the webhook endpoint.
#[derive(thiserror::Error, Debug)]
pub enum WebhookError {
    /// Transport failure or non-success status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<WebhookError> for CoreError {
    fn from(err: WebhookError) -> Self {
        CoreError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'event> {
    channel: String,
    sent_at: DateTime<Utc>,
    #[serde(flatten)]
    event: &'event DomainEvent,
}

impl<'event> Envelope<'event> {
    fn new(event: &'event DomainEvent, sent_at: DateTime<Utc>) -> Self {
        Self {
            channel: event.audience().channel(),
            sent_at,
            event,
        }
    }
}

/// Delivers events with `POST {endpoint}`.
pub struct WebhookSink {
    client: Client,
    endpoint: String,
}

impl WebhookSink {
    /// Create a sink bound to the given HTTP client and endpoint URL.
    #[must_use]
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn post(&self, event: &DomainEvent) -> Result<(), WebhookError> {
        self.client
            .post(&self.endpoint)
            .json(&Envelope::new(event, Utc::now()))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        self.post(event).await?;
        debug!(endpoint = %self.endpoint, event = event.name(), "webhook accepted event");
        Ok(())
    }
}

/// Build a webhook sink ready to register with an event dispatcher.
#[must_use]
pub fn sink(client: Client, endpoint: impl Into<String>) -> Arc<dyn EventSink> {
    Arc::new(WebhookSink::new(client, endpoint))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use kerbside_core::{BinId, BinStatus, ErrorKind, RouteId};
    use serde_json::json;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 7, 15, 0).unwrap()
    }

    #[test]
    fn envelope_carries_channel_and_event_fields() {
        let event = DomainEvent::BinUpdated {
            bin_id: BinId::from("bin-1"),
            fill_level: 80,
            status: BinStatus::Full,
        };
        let body = serde_json::to_value(Envelope::new(&event, at())).unwrap();
        assert_eq!(
            body,
            json!({
                "channel": "bins",
                "sent_at": "2024-03-04T07:15:00Z",
                "event": "binUpdated",
                "bin_id": "bin-1",
                "fill_level": 80,
                "status": "full",
            })
        );
    }

    #[test]
    fn route_completion_goes_to_operators() {
        let event = DomainEvent::RouteCompleted {
            route_id: RouteId::from("route-9"),
            ended_at: at(),
            actual_duration_min: Some(42),
        };
        let body = serde_json::to_value(Envelope::new(&event, at())).unwrap();
        assert_eq!(body["channel"], "admin");
        assert_eq!(body["actual_duration_min"], 42);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let sink = WebhookSink::new(Client::new(), "http://127.0.0.1:9/events");
        let event = DomainEvent::BinUpdated {
            bin_id: BinId::from("bin-1"),
            fill_level: 10,
            status: BinStatus::Empty,
        };
        let err = sink.publish(&event).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
