//! A bounded, broker-backed buffer for observability events.
//!
//! This crate sits between a high-volume producer path (every inbound
//! request may emit an event) and a low-frequency consumer path (a
//! periodic reporter drains batches and hands them to a webhook sender).
//! All coordination goes through a message broker addressed by URL; the
//! broker is the single source of truth for queue state, so producers and
//! consumers in unrelated processes need no locking of their own.
//!
//! ## Guarantees
//! - Bounded backlog per event type, enforced atomically at the broker
//! - Durable backlog across buffer handles (as durable as the broker)
//! - Namespace isolation between deployments sharing one broker
//! - Producers are never blocked or failed by observability outages
//!
//! ## Non-Guarantees
//! - Exactly-once delivery
//! - Ordering across event types
//! - Redelivery of events whose webhook send failed
//!
//! The webhook transport, the settings loader and the task scheduler are
//! external collaborators reached through narrow traits.

mod broker;
mod buffer;
mod connection;
mod error;
mod recorder;
mod reporter;
mod retry;
mod types;

#[cfg(feature = "redis")]
mod broker_redis;

pub use broker::{BrokerError, BrokerQueue, MemoryBroker, PushOutcome};
pub use buffer::{
    get_buffer, get_events, open_buffer, put_event, size_in_batches, EventBuffer,
    ObservabilityConfig,
};
pub use connection::observability_connection;
pub use error::{ObservabilityError, Result};
pub use recorder::{record_delivery_attempt, AttemptReporter};
pub use reporter::{
    dispatch_report_jobs, send_observability_events, WebhookRegistry, WebhookSender,
};
pub use retry::{next_retry_date, RetryDirective};
pub use types::{DeliveryAttempt, DeliveryResponse, EventType, WebhookTarget};

#[cfg(feature = "redis")]
pub use broker_redis::RedisBroker;
