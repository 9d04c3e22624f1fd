use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::buffer::{open_buffer, ObservabilityConfig};
use crate::error::Result;
use crate::types::{DeliveryResponse, EventType, WebhookTarget};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

#[cfg(feature = "tracing")]
fn trace_warn(message: &str) {
    tracing::warn!("{message}");
}

#[cfg(not(feature = "tracing"))]
fn trace_warn(_message: &str) {}

/// How long one drain job waits for the first item of its batch. Backlog
/// was counted before the job was dispatched, so near-zero is enough.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Looks up the webhooks subscribed to an observability event type.
pub trait WebhookRegistry: Send + Sync {
    fn webhooks_for_event(&self, event_type: EventType) -> Vec<WebhookTarget>;
}

/// Transport collaborator that ships one serialized payload to one target.
///
/// The buffer hands it strings and reads back a success/failure signal;
/// everything about HTTP, pubsub or signing lives behind this trait.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(
        &self,
        target_url: &str,
        domain: &str,
        secret: Option<&str>,
        event_type: EventType,
        payload: &str,
    ) -> DeliveryResponse;
}

/// One drain job: dequeue one batch and forward each event individually to
/// every webhook registered for the event type.
///
/// An empty batch ends the job with no collaborator calls at all. A failed
/// send marks that one item "not confirmed delivered" and does not block
/// later items; nothing is re-enqueued.
pub async fn send_observability_events(
    config: &ObservabilityConfig,
    registry: &dyn WebhookRegistry,
    sender: &dyn WebhookSender,
    event_type: EventType,
) -> Result<()> {
    let buffer = open_buffer(config, event_type)?;
    let events = buffer.get_events(DRAIN_TIMEOUT, None).await?;
    if events.is_empty() {
        return Ok(());
    }

    for webhook in registry.webhooks_for_event(event_type) {
        for event in &events {
            let payload = serde_json::to_string(event)?;
            let response = sender
                .send(
                    &webhook.target_url,
                    &config.site_domain,
                    webhook.secret.as_deref(),
                    event_type,
                    &payload,
                )
                .await;
            if !response.success {
                metric_inc("observability.report.send_failed");
                trace_warn(&format!(
                    "observability event not confirmed delivered to {}: {}",
                    webhook.target_url,
                    response.detail.as_deref().unwrap_or("no detail"),
                ));
            }
        }
    }

    Ok(())
}

/// One reporting period: count pending batches per event type and spawn
/// that many independent drain jobs.
///
/// Jobs are dispatched fire-and-forget with an expiration equal to
/// `report_period`; a job that has not started by then abandons itself, so
/// an overloaded runtime sheds stale work instead of queueing it forever.
/// Zero backlog across all event types dispatches nothing. The returned
/// handles may be dropped by production callers or awaited by tests.
pub async fn dispatch_report_jobs(
    config: &ObservabilityConfig,
    registry: Arc<dyn WebhookRegistry>,
    sender: Arc<dyn WebhookSender>,
) -> Result<Vec<JoinHandle<()>>> {
    let expires_at = Instant::now() + config.report_period;
    let mut handles = Vec::new();

    for event_type in EventType::ALL {
        let batches = open_buffer(config, event_type)?.size_in_batches().await?;
        for _ in 0..batches {
            let config = config.clone();
            let registry = registry.clone();
            let sender = sender.clone();
            handles.push(tokio::spawn(async move {
                if Instant::now() >= expires_at {
                    metric_inc("observability.report.job_expired");
                    trace_warn("drain job expired before starting, shedding it");
                    return;
                }
                if let Err(err) =
                    send_observability_events(&config, registry.as_ref(), sender.as_ref(), event_type)
                        .await
                {
                    metric_inc("observability.report.job_failed");
                    trace_warn(&format!("drain job for {event_type} failed: {err}"));
                }
            }));
        }
    }

    if !handles.is_empty() {
        metric_inc("observability.report.dispatched");
    }
    Ok(handles)
}
