use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::broker::{BrokerError, BrokerQueue, PushOutcome};
use crate::connection::observability_connection;
use crate::error::{ObservabilityError, Result};
use crate::types::EventType;

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

#[cfg(feature = "tracing")]
fn trace_event(message: &'static str) {
    tracing::debug!(message);
}

#[cfg(not(feature = "tracing"))]
fn trace_event(_message: &'static str) {}

/// Resolved configuration the buffer consumes read-only.
///
/// Settings loading is external; callers hand in already-resolved values.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Broker connection string (`memory://...`, `redis://...`).
    pub broker_url: String,

    /// Default number of items dequeued per batch.
    pub buffer_batch: usize,

    /// Maximum backlog per event type; `None` means unbounded.
    pub buffer_size_limit: Option<usize>,

    /// Reporting period; used only as the expiration of dispatched drain jobs.
    pub report_period: Duration,

    /// Namespace prefix isolating this deployment's queues on a shared broker.
    pub queue_prefix: String,

    /// Site domain handed to the webhook sender alongside each payload.
    pub site_domain: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            broker_url: "memory://observability".to_string(),
            buffer_batch: 100,
            buffer_size_limit: Some(1_000),
            report_period: Duration::from_secs(20),
            queue_prefix: "observability".to_string(),
            site_domain: "localhost".to_string(),
        }
    }
}

/// A bounded, broker-backed queue for one `(prefix, event_type)` pair.
///
/// Many producers and consumers may hold independent buffers addressing the
/// same pair; the broker is the single source of truth for queue state, so
/// no in-process coordination happens here. Dropping the buffer releases
/// the connection handle but never the queued data.
pub struct EventBuffer {
    broker: Arc<dyn BrokerQueue>,
    event_type: EventType,
    queue: String,
    batch: usize,
    max_length: Option<usize>,
}

impl std::fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuffer")
            .field("event_type", &self.event_type)
            .field("queue", &self.queue)
            .field("batch", &self.batch)
            .field("max_length", &self.max_length)
            .finish_non_exhaustive()
    }
}

impl EventBuffer {
    pub fn new(
        broker: Arc<dyn BrokerQueue>,
        prefix: &str,
        event_type: EventType,
        batch: usize,
        max_length: Option<usize>,
    ) -> Self {
        let queue = format!("{prefix}:observability_buffer:{event_type}");
        Self {
            broker,
            event_type,
            queue,
            batch: batch.max(1),
            max_length,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Default batch fetch size.
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Configured backlog cap, if any.
    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    /// Fully-qualified broker queue name.
    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    /// Append one serialized payload to the tail of the queue.
    ///
    /// The payload is treated as an atomic unit and never parsed on write.
    /// When `max_length` is set, the cap is enforced by the broker itself,
    /// so concurrent producers on separate connections cannot overshoot it;
    /// a buffer at the cap fails with [`ObservabilityError::BufferFull`] and
    /// stores nothing.
    pub async fn put_event(&self, payload: &str) -> Result<()> {
        let outcome = self
            .broker
            .push(&self.queue, payload, self.max_length)
            .await?;
        match outcome {
            PushOutcome::Stored => {
                metric_inc("observability.buffer.put");
                Ok(())
            }
            PushOutcome::Full => {
                metric_inc("observability.buffer.full");
                trace_event("observability buffer full, event dropped");
                Err(ObservabilityError::BufferFull {
                    event_type: self.event_type,
                    max_length: self.max_length.unwrap_or(0),
                })
            }
        }
    }

    /// Dequeue up to `batch` items (default: the configured batch size),
    /// waiting up to `timeout` overall for items to arrive.
    ///
    /// Returns whatever arrived within the window, possibly empty, each item
    /// deserialized into a structured value. Never blocks past `timeout`.
    pub async fn get_events(&self, timeout: Duration, batch: Option<usize>) -> Result<Vec<Value>> {
        let batch = batch.unwrap_or(self.batch).max(1);
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();

        while events.len() < batch {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(payload) = self.broker.pop(&self.queue, remaining).await? else {
                break;
            };
            events.push(serde_json::from_str(&payload)?);
        }

        Ok(events)
    }

    /// Current backlog for this event type.
    ///
    /// The queue is created lazily on first put, so a broker that has never
    /// seen it reports "no such queue"; that one signal is read as 0.
    pub async fn size(&self) -> Result<usize> {
        match self.broker.len(&self.queue).await {
            Ok(len) => Ok(len),
            Err(BrokerError::QueueNotFound(_)) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.size().await? == 0)
    }

    /// Number of drain jobs needed to empty the current backlog.
    pub async fn size_in_batches(&self) -> Result<usize> {
        Ok(self.size().await?.div_ceil(self.batch))
    }

    /// Discard the entire backlog unconditionally.
    ///
    /// Safe to call on an empty or never-created queue.
    pub async fn clear(&self) -> Result<()> {
        match self.broker.purge(&self.queue).await {
            Ok(()) | Err(BrokerError::QueueNotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Build a buffer for an already-validated event type.
///
/// Composes the connection provider and applies the configured batch size
/// and backlog cap. The buffer holds the connection until dropped.
pub fn open_buffer(config: &ObservabilityConfig, event_type: EventType) -> Result<EventBuffer> {
    let broker = observability_connection(&config.broker_url)?;
    Ok(EventBuffer::new(
        broker,
        &config.queue_prefix,
        event_type,
        config.buffer_batch,
        config.buffer_size_limit,
    ))
}

/// Build a buffer for a dynamic event-type string.
///
/// Fails with [`ObservabilityError::UnknownEventType`] when the string is
/// not in the observability allow-list; the check happens here, once, not
/// at every call site.
pub fn get_buffer(config: &ObservabilityConfig, event_type: &str) -> Result<EventBuffer> {
    let event_type: EventType = event_type.parse()?;
    open_buffer(config, event_type)
}

/// Producer entry point: resolve a buffer, put one event, release.
///
/// Producers on the request path are expected to treat every error here as
/// droppable ([`ObservabilityError::is_droppable`]); a full buffer or a
/// broker outage must never fail the request that produced the event.
pub async fn put_event(config: &ObservabilityConfig, event_type: &str, payload: &str) -> Result<()> {
    get_buffer(config, event_type)?.put_event(payload).await
}

/// Consumer entry point: resolve a buffer, drain one batch, release.
pub async fn get_events(
    config: &ObservabilityConfig,
    event_type: &str,
    timeout: Duration,
) -> Result<Vec<Value>> {
    get_buffer(config, event_type)?
        .get_events(timeout, None)
        .await
}

/// Consumer entry point: backlog size in batches for one event type.
pub async fn size_in_batches(config: &ObservabilityConfig, event_type: &str) -> Result<usize> {
    get_buffer(config, event_type)?.size_in_batches().await
}
