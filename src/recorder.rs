use serde_json::Value;

use crate::types::{DeliveryAttempt, EventType};

/// Pluggable hook that receives delivery-attempt reports.
///
/// Called synchronously, exactly once per forwarded attempt, with no retry.
/// Implementations are expected not to panic for normal inputs.
pub trait AttemptReporter: Send + Sync {
    fn report_delivery_attempt(&self, attempt: &DeliveryAttempt, extra: Option<&Value>);
}

/// Forward a delivery attempt to the reporting hook, unless the attempt
/// belongs to an observability event type itself.
///
/// Reporting our own delivery attempts would feed the buffer with events
/// about draining the buffer, forever. Attempts for every other event type
/// are forwarded unchanged.
pub fn record_delivery_attempt(
    hook: &dyn AttemptReporter,
    event_type: &str,
    attempt: &DeliveryAttempt,
    extra: Option<&Value>,
) {
    if event_type.parse::<EventType>().is_ok() {
        return;
    }
    hook.report_delivery_attempt(attempt, extra);
}
