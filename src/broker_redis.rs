use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::broker::{BrokerError, BrokerQueue, PushOutcome};

// LLEN + RPUSH in one script so the cap holds across producers on
// unrelated connections. ARGV[2] == 0 means unbounded.
const BOUNDED_PUSH: &str = r#"
if tonumber(ARGV[2]) > 0 and redis.call('LLEN', KEYS[1]) >= tonumber(ARGV[2]) then
    return 0
end
redis.call('RPUSH', KEYS[1], ARGV[1])
return 1
"#;

/// Redis broker backend. Queues are Redis lists.
pub struct RedisBroker {
    client: redis::Client,
    bounded_push: redis::Script,
}

impl std::fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBroker")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl RedisBroker {
    pub fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url).map_err(map_err)?;
        Ok(Self {
            client,
            bounded_push: redis::Script::new(BOUNDED_PUSH),
        })
    }

    async fn connection(&self) -> Result<redis::aio::Connection, BrokerError> {
        self.client.get_tokio_connection().await.map_err(map_err)
    }
}

fn map_err(err: redis::RedisError) -> BrokerError {
    if err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_io_error()
        || err.is_timeout()
    {
        BrokerError::Connection(err.to_string())
    } else {
        BrokerError::Protocol(err.to_string())
    }
}

#[async_trait]
impl BrokerQueue for RedisBroker {
    async fn push(
        &self,
        queue: &str,
        payload: &str,
        max_length: Option<usize>,
    ) -> Result<PushOutcome, BrokerError> {
        let mut conn = self.connection().await?;
        let max = max_length.unwrap_or(0) as i64;
        let stored: i64 = self
            .bounded_push
            .key(queue)
            .arg(payload)
            .arg(max)
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;
        if stored == 1 {
            Ok(PushOutcome::Stored)
        } else {
            Ok(PushOutcome::Full)
        }
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BrokerError> {
        let mut conn = self.connection().await?;

        if timeout.is_zero() {
            let item: Option<String> = conn.lpop(queue, None).await.map_err(map_err)?;
            return Ok(item);
        }

        // BLPOP with no server-side limit; the client deadline cancels the
        // call by dropping this per-operation connection.
        let reply = tokio::time::timeout(timeout, async {
            let item: Option<(String, String)> = conn.blpop(queue, 0.0).await?;
            Ok::<_, redis::RedisError>(item)
        })
        .await;

        match reply {
            Err(_elapsed) => Ok(None),
            Ok(item) => Ok(item.map_err(map_err)?.map(|(_queue, value)| value)),
        }
    }

    async fn len(&self, queue: &str) -> Result<usize, BrokerError> {
        let mut conn = self.connection().await?;
        // Redis reports 0 for a missing key; no narrower "no such queue"
        // signal exists on this backend.
        conn.llen(queue).await.map_err(map_err)
    }

    async fn purge(&self, queue: &str) -> Result<(), BrokerError> {
        let mut conn = self.connection().await?;
        let _: i64 = conn.del(queue).await.map_err(map_err)?;
        Ok(())
    }
}
