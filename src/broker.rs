use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout_at, Instant};

/// Transport-level failures surfaced by a broker backend.
///
/// Backends map their native errors into these three kinds before anything
/// reaches the buffer. Only the narrowest "no such queue" signal may become
/// [`BrokerError::QueueNotFound`]; every other protocol failure is real.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Connection could not be established or dropped mid-operation.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Any other broker-protocol failure (channel error, bad reply, ...).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The named queue has never been created on this broker.
    #[error("no such queue: {0}")]
    QueueNotFound(String),
}

/// Result of a bounded append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Stored,
    Full,
}

/// The five queue primitives this core needs from a broker.
///
/// Any broker exposing named-queue append, blocking take, length, purge and
/// connection open/close is sufficient. The queue is the only shared mutable
/// resource: every guarantee (size cap, atomic append) is enforced at the
/// broker-operation level so that unrelated processes need no coordination.
#[async_trait]
pub trait BrokerQueue: Send + Sync + std::fmt::Debug {
    /// Append `payload` to the tail of `queue`.
    ///
    /// When `max_length` is set, the length check and the append must not
    /// race with concurrent pushers on other connections: a queue already at
    /// the cap reports [`PushOutcome::Full`] and stores nothing.
    async fn push(
        &self,
        queue: &str,
        payload: &str,
        max_length: Option<usize>,
    ) -> Result<PushOutcome, BrokerError>;

    /// Remove and return the head item, waiting up to `timeout` for one to
    /// become available. Must never block past the timeout.
    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BrokerError>;

    /// Current number of queued items.
    async fn len(&self, queue: &str) -> Result<usize, BrokerError>;

    /// Discard every queued item unconditionally.
    async fn purge(&self, queue: &str) -> Result<(), BrokerError>;
}

/// Queue state shared by every connection to one `memory://` URL.
struct MemoryState {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    arrivals: Notify,
}

/// In-process broker backend.
///
/// Connections to the same URL address the same queues, so independent
/// handles observe each other's writes exactly like they would against an
/// external broker. Durability ends with the process; this backend exists
/// for tests and embedded single-process deployments.
pub struct MemoryBroker {
    state: Arc<MemoryState>,
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker").finish_non_exhaustive()
    }
}

fn registry() -> &'static StdMutex<HashMap<String, Arc<MemoryState>>> {
    static REGISTRY: OnceLock<StdMutex<HashMap<String, Arc<MemoryState>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| StdMutex::new(HashMap::new()))
}

impl MemoryBroker {
    /// Open a connection to the broker identified by `url`.
    pub fn connect(url: &str) -> Self {
        let mut brokers = registry().lock().unwrap_or_else(PoisonError::into_inner);
        let state = brokers
            .entry(url.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryState {
                    queues: Mutex::new(HashMap::new()),
                    arrivals: Notify::new(),
                })
            })
            .clone();
        Self { state }
    }

    /// Drop every queue held for `url`. Test/reset path; live connections to
    /// the old state keep working but new connections start empty.
    pub fn reset(url: &str) {
        let mut brokers = registry().lock().unwrap_or_else(PoisonError::into_inner);
        brokers.remove(url);
    }
}

#[async_trait]
impl BrokerQueue for MemoryBroker {
    async fn push(
        &self,
        queue: &str,
        payload: &str,
        max_length: Option<usize>,
    ) -> Result<PushOutcome, BrokerError> {
        {
            let mut queues = self.state.queues.lock().await;
            let items = queues.entry(queue.to_string()).or_default();
            if let Some(max) = max_length {
                if items.len() >= max {
                    return Ok(PushOutcome::Full);
                }
            }
            items.push_back(payload.to_string());
        }
        self.state.arrivals.notify_waiters();
        Ok(PushOutcome::Stored)
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BrokerError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register for wakeups before checking, so an arrival between the
            // check and the wait is not lost.
            let notified = self.state.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let item = {
                let mut queues = self.state.queues.lock().await;
                queues.get_mut(queue).and_then(VecDeque::pop_front)
            };
            if let Some(item) = item {
                return Ok(Some(item));
            }

            if timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self, queue: &str) -> Result<usize, BrokerError> {
        let queues = self.state.queues.lock().await;
        match queues.get(queue) {
            Some(items) => Ok(items.len()),
            None => Err(BrokerError::QueueNotFound(queue.to_string())),
        }
    }

    async fn purge(&self, queue: &str) -> Result<(), BrokerError> {
        let mut queues = self.state.queues.lock().await;
        if let Some(items) = queues.get_mut(queue) {
            items.clear();
        }
        Ok(())
    }
}
