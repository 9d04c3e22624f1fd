use thiserror::Error;

use crate::broker::BrokerError;
use crate::types::EventType;

/// Result alias using [`ObservabilityError`].
pub type Result<T> = std::result::Result<T, ObservabilityError>;

/// Stable error taxonomy of the observability buffer.
///
/// Transport-level failures are translated at the buffer boundary:
/// connection loss becomes [`ObservabilityError::Connection`], every other
/// broker-protocol failure becomes [`ObservabilityError::Broker`]. The
/// mapping applies uniformly to put, get, size and clear. Anything that is
/// not a transport failure propagates as its own variant.
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// Broker connection could not be established or was lost mid-operation.
    #[error("observability broker connection failed: {0}")]
    Connection(String),

    /// Broker-protocol failure other than connection loss.
    #[error("observability broker operation failed: {0}")]
    Broker(String),

    /// `put_event` found the buffer at its configured cap.
    ///
    /// Always recoverable; the expected producer policy is drop-and-continue.
    #[error("observability buffer for {event_type} is full (max_length = {max_length})")]
    BufferFull {
        event_type: EventType,
        max_length: usize,
    },

    /// Event type not present in the observability allow-list.
    #[error("unknown observability event type: {0:?}")]
    UnknownEventType(String),

    /// Stored payload could not be (de)serialized.
    #[error("invalid event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<BrokerError> for ObservabilityError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Connection(msg) => ObservabilityError::Connection(msg),
            BrokerError::Protocol(msg) => ObservabilityError::Broker(msg),
            BrokerError::QueueNotFound(queue) => {
                ObservabilityError::Broker(format!("no such queue: {queue}"))
            }
        }
    }
}

impl ObservabilityError {
    /// Whether a producer on the request path may safely drop the event and
    /// carry on. Transport outages and a full buffer never fail the request
    /// that produced the event.
    pub fn is_droppable(&self) -> bool {
        matches!(
            self,
            ObservabilityError::Connection(_)
                | ObservabilityError::Broker(_)
                | ObservabilityError::BufferFull { .. }
        )
    }
}
