use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ObservabilityError;

/// Category of observability event collected by this buffer.
///
/// The variants form the closed allow-list of recognized event types.
/// Dynamic strings coming from the outside are validated once, at buffer
/// construction time, by parsing into this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Traces of inbound API calls.
    #[serde(rename = "observability_api_calls")]
    ApiCalls,

    /// Webhook delivery attempt records.
    #[serde(rename = "observability_event_delivery_attempts")]
    EventDeliveryAttempts,
}

impl EventType {
    /// Every recognized observability event type.
    pub const ALL: [EventType; 2] = [EventType::ApiCalls, EventType::EventDeliveryAttempts];

    /// Wire name of the event type; also the queue name suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ApiCalls => "observability_api_calls",
            EventType::EventDeliveryAttempts => "observability_event_delivery_attempts",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ObservabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|et| et.as_str() == s)
            .ok_or_else(|| ObservabilityError::UnknownEventType(s.to_string()))
    }
}

/// Metadata about one webhook delivery attempt.
///
/// Opaque to this core beyond allow-list gating; the reporting hook
/// receives it unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// Logical identifier of the attempt.
    pub id: String,

    /// When the attempt was made.
    pub created_at: DateTime<Utc>,

    /// HTTP status returned by the target, if any response arrived.
    pub response_status: Option<u16>,

    /// Response body or transport error detail.
    pub response: Option<String>,
}

impl DeliveryAttempt {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            response_status: None,
            response: None,
        }
    }

    pub fn with_response(mut self, status: u16, body: impl Into<String>) -> Self {
        self.response_status = Some(status);
        self.response = Some(body.into());
        self
    }
}

/// Destination registered for an observability event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTarget {
    /// Target URL; the scheme selects the transport (HTTP, pubsub, ...).
    pub target_url: String,

    /// Optional secret handed to the sender for request signing.
    pub secret: Option<String>,
}

impl WebhookTarget {
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

/// Success/failure signal returned by the webhook sender collaborator.
///
/// A non-success response means "this item not confirmed delivered"; the
/// buffer never retries or re-enqueues it.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    pub success: bool,
    pub detail: Option<String>,
}

impl DeliveryResponse {
    pub fn ok() -> Self {
        Self { success: true, detail: None }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: Some(detail.into()),
        }
    }
}
