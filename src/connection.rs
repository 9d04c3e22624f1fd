use std::sync::Arc;

use crate::broker::{BrokerQueue, MemoryBroker};
use crate::error::{ObservabilityError, Result};

/// Open a broker connection for the duration of the returned handle.
///
/// The URL scheme selects the backend: `memory://` is always available;
/// `redis://` and `rediss://` require the `redis` feature. Any failure to
/// establish the connection surfaces as [`ObservabilityError::Connection`].
/// Dropping the handle releases the connection; queued data outlives it.
pub fn observability_connection(broker_url: &str) -> Result<Arc<dyn BrokerQueue>> {
    let scheme = broker_url.split("://").next().unwrap_or("");
    match scheme {
        "memory" => Ok(Arc::new(MemoryBroker::connect(broker_url))),

        #[cfg(feature = "redis")]
        "redis" | "rediss" => {
            let broker = crate::broker_redis::RedisBroker::connect(broker_url)
                .map_err(|err| ObservabilityError::Connection(err.to_string()))?;
            Ok(Arc::new(broker))
        }

        other => Err(ObservabilityError::Connection(format!(
            "unsupported broker scheme {other:?} in {broker_url:?}"
        ))),
    }
}
