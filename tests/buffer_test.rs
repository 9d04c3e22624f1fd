use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use observability_buffer::{
    get_buffer, open_buffer, put_event, size_in_batches, BrokerError, BrokerQueue, EventBuffer,
    EventType, ObservabilityConfig, ObservabilityError, PushOutcome,
};
use serde_json::json;

const EVENT_TYPE: EventType = EventType::ApiCalls;
const TEST_TIMEOUT: Duration = Duration::from_millis(100);

fn config(name: &str) -> ObservabilityConfig {
    ObservabilityConfig {
        broker_url: format!("memory://{name}"),
        buffer_batch: 10,
        ..Default::default()
    }
}

async fn fill_buffer(buffer: &EventBuffer, count: usize) {
    let payload = json!({"test": "data"}).to_string();
    for _ in 0..count {
        buffer.put_event(&payload).await.unwrap();
    }
}

#[tokio::test]
async fn clear_buffer_discards_backlog() {
    let buffer = open_buffer(&config("clear"), EVENT_TYPE).unwrap();
    fill_buffer(&buffer, 10).await;
    assert_eq!(buffer.size().await.unwrap(), 10);

    buffer.clear().await.unwrap();
    assert_eq!(buffer.size().await.unwrap(), 0);
}

#[tokio::test]
async fn clear_never_created_queue_is_a_no_op() {
    let buffer = open_buffer(&config("clear-missing"), EVENT_TYPE).unwrap();
    buffer.clear().await.unwrap();
    assert_eq!(buffer.size().await.unwrap(), 0);
}

#[tokio::test]
async fn backlog_outlives_the_buffer_handle() {
    let cfg = config("durable");
    {
        let buffer = open_buffer(&cfg, EVENT_TYPE).unwrap();
        buffer
            .put_event(&json!({"test": "data"}).to_string())
            .await
            .unwrap();
        assert_eq!(buffer.size().await.unwrap(), 1);
    }

    let buffer = open_buffer(&cfg, EVENT_TYPE).unwrap();
    assert_eq!(buffer.size().await.unwrap(), 1);
    buffer.get_events(TEST_TIMEOUT, Some(1)).await.unwrap();
    assert_eq!(buffer.size().await.unwrap(), 0);
}

#[tokio::test]
async fn queue_prefixes_isolate_backlogs() {
    let mut cfg_a = config("prefixes");
    cfg_a.queue_prefix = "first_prefix".to_string();
    let mut cfg_b = cfg_a.clone();
    cfg_b.queue_prefix = "second_prefix".to_string();

    let buffer_a = open_buffer(&cfg_a, EVENT_TYPE).unwrap();
    let buffer_b = open_buffer(&cfg_b, EVENT_TYPE).unwrap();
    fill_buffer(&buffer_a, 5).await;
    fill_buffer(&buffer_b, 3).await;

    assert_eq!(buffer_a.size().await.unwrap(), 5);
    assert_eq!(buffer_b.size().await.unwrap(), 3);

    // A fresh handle on the first prefix still sees its own backlog only.
    let buffer_a2 = open_buffer(&cfg_a, EVENT_TYPE).unwrap();
    assert_eq!(buffer_a2.size().await.unwrap(), 5);
}

#[tokio::test]
async fn size_in_batches_rounds_up() {
    let buffer = open_buffer(&config("batches"), EVENT_TYPE).unwrap();
    assert_eq!(buffer.size_in_batches().await.unwrap(), 0);

    fill_buffer(&buffer, 11).await;
    assert_eq!(buffer.size_in_batches().await.unwrap(), 2);
}

#[tokio::test]
async fn get_events_returns_what_is_available() {
    let buffer = open_buffer(&config("partial-batch"), EVENT_TYPE).unwrap();
    fill_buffer(&buffer, 10).await;

    let events = buffer.get_events(TEST_TIMEOUT, Some(20)).await.unwrap();

    assert_eq!(events.len(), 10);
    assert_eq!(buffer.size().await.unwrap(), 0);
}

#[tokio::test]
async fn size_of_never_created_queue_is_zero() {
    let buffer = open_buffer(&config("no-queue"), EVENT_TYPE).unwrap();
    assert_eq!(buffer.size().await.unwrap(), 0);
    assert!(buffer.is_empty().await.unwrap());
}

#[tokio::test]
async fn payloads_round_trip_through_the_broker() {
    let buffer = open_buffer(&config("round-trip"), EVENT_TYPE).unwrap();
    let event = json!({"test": "data"});

    buffer.put_event(&event.to_string()).await.unwrap();
    let events = buffer.get_events(TEST_TIMEOUT, None).await.unwrap();

    assert_eq!(events[0], event);
}

#[tokio::test]
async fn put_past_the_cap_fails_and_stores_nothing() {
    let mut cfg = config("max-length");
    cfg.buffer_size_limit = Some(10);
    let buffer = open_buffer(&cfg, EVENT_TYPE).unwrap();
    fill_buffer(&buffer, 10).await;

    let err = buffer
        .put_event(&json!({"skipped": "event"}).to_string())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ObservabilityError::BufferFull { max_length: 10, .. }
    ));
    assert!(err.is_droppable());
    assert_eq!(buffer.size().await.unwrap(), 10);
}

#[tokio::test]
async fn concurrent_producers_never_overshoot_the_cap() {
    let mut cfg = config("concurrent-cap");
    cfg.buffer_size_limit = Some(10);

    let mut tasks = Vec::new();
    for i in 0..50 {
        let cfg = cfg.clone();
        tasks.push(tokio::spawn(async move {
            // Independent buffer per producer, like separate worker processes.
            let buffer = open_buffer(&cfg, EVENT_TYPE).unwrap();
            buffer.put_event(&json!({"n": i}).to_string()).await.is_ok()
        }));
    }

    let mut stored = 0;
    for task in tasks {
        if task.await.unwrap() {
            stored += 1;
        }
    }

    assert_eq!(stored, 10);
    let buffer = open_buffer(&cfg, EVENT_TYPE).unwrap();
    assert_eq!(buffer.size().await.unwrap(), 10);
}

#[tokio::test]
async fn get_events_on_empty_queue_returns_within_timeout() {
    let buffer = open_buffer(&config("empty-timeout"), EVENT_TYPE).unwrap();

    let started = Instant::now();
    let events = buffer.get_events(TEST_TIMEOUT, None).await.unwrap();

    assert!(events.is_empty());
    assert!(started.elapsed() >= TEST_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn factory_rejects_unknown_event_types() {
    let err = get_buffer(&config("wrong-type"), "WRONG_EVENT_TYPE").unwrap_err();
    assert!(matches!(err, ObservabilityError::UnknownEventType(_)));
}

#[tokio::test]
async fn factory_applies_configuration() {
    let cfg = ObservabilityConfig {
        broker_url: "memory://factory-settings".to_string(),
        buffer_batch: 3,
        buffer_size_limit: Some(5),
        ..Default::default()
    };

    let buffer = get_buffer(&cfg, EVENT_TYPE.as_str()).unwrap();

    assert_eq!(buffer.batch(), 3);
    assert_eq!(buffer.max_length(), Some(5));
    assert_eq!(buffer.event_type(), EVENT_TYPE);
}

#[tokio::test]
async fn module_level_put_and_get() {
    let cfg = config("module-api");
    let payload = json!({"test": "payload"});

    put_event(&cfg, EVENT_TYPE.as_str(), &payload.to_string())
        .await
        .unwrap();

    let events = observability_buffer::get_events(&cfg, EVENT_TYPE.as_str(), TEST_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(events, vec![payload]);
}

#[tokio::test]
async fn module_level_size_in_batches() {
    let cfg = config("module-batches");
    let buffer = open_buffer(&cfg, EVENT_TYPE).unwrap();
    fill_buffer(&buffer, 11).await;

    assert_eq!(
        size_in_batches(&cfg, EVENT_TYPE.as_str()).await.unwrap(),
        2
    );
}

/// Broker that fails every operation with a chosen error kind.
#[derive(Debug)]
struct FailingBroker {
    kind: fn(String) -> BrokerError,
}

#[async_trait]
impl BrokerQueue for FailingBroker {
    async fn push(
        &self,
        queue: &str,
        _payload: &str,
        _max_length: Option<usize>,
    ) -> Result<PushOutcome, BrokerError> {
        Err((self.kind)(queue.to_string()))
    }

    async fn pop(&self, queue: &str, _timeout: Duration) -> Result<Option<String>, BrokerError> {
        Err((self.kind)(queue.to_string()))
    }

    async fn len(&self, queue: &str) -> Result<usize, BrokerError> {
        Err((self.kind)(queue.to_string()))
    }

    async fn purge(&self, queue: &str) -> Result<(), BrokerError> {
        Err((self.kind)(queue.to_string()))
    }
}

fn failing_buffer(kind: fn(String) -> BrokerError) -> EventBuffer {
    EventBuffer::new(Arc::new(FailingBroker { kind }), "test", EVENT_TYPE, 10, None)
}

#[tokio::test]
async fn transport_errors_map_to_the_internal_taxonomy() {
    let buffer = failing_buffer(BrokerError::Connection);
    assert!(matches!(
        buffer.put_event("{}").await.unwrap_err(),
        ObservabilityError::Connection(_)
    ));
    assert!(matches!(
        buffer.get_events(Duration::ZERO, None).await.unwrap_err(),
        ObservabilityError::Connection(_)
    ));

    let buffer = failing_buffer(BrokerError::Protocol);
    assert!(matches!(
        buffer.put_event("{}").await.unwrap_err(),
        ObservabilityError::Broker(_)
    ));
    assert!(matches!(
        buffer.size().await.unwrap_err(),
        ObservabilityError::Broker(_)
    ));
    assert!(matches!(
        buffer.clear().await.unwrap_err(),
        ObservabilityError::Broker(_)
    ));
}

#[tokio::test]
async fn queue_not_found_is_swallowed_only_for_size_and_clear() {
    let buffer = failing_buffer(BrokerError::QueueNotFound);

    assert_eq!(buffer.size().await.unwrap(), 0);
    buffer.clear().await.unwrap();

    // Put must not hide the failure.
    assert!(matches!(
        buffer.put_event("{}").await.unwrap_err(),
        ObservabilityError::Broker(_)
    ));
}

#[tokio::test]
async fn malformed_stored_payload_is_a_payload_error() {
    let buffer = open_buffer(&config("bad-payload"), EVENT_TYPE).unwrap();
    buffer.put_event("not json at all").await.unwrap();

    let err = buffer.get_events(TEST_TIMEOUT, None).await.unwrap_err();
    assert!(matches!(err, ObservabilityError::Payload(_)));
    assert!(!err.is_droppable());
}
