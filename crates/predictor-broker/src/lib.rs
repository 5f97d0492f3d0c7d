//! Queue broker gateway (C2): enqueue/blocking-dequeue primitives over
//! named list-queues, backed by Redis.
//!
//! Grounded on `original_source/src/events/event_bus.py`'s use of
//! `redis.asyncio.Redis` and on the `redis::aio::ConnectionManager` usage
//! pattern retrieved from the pack's `dashflow-redis` crate
//! (`Client::open` → `ConnectionManager::new` → `redis::cmd(..).query_async`).

use async_trait::async_trait;
use predictor_common::{Error, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{info, warn};

/// Enqueue/dequeue primitives over a remote list-queue broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// `RPUSH queue payload` — publish, appended at the list's tail.
    async fn push(&self, queue: &str, payload: &[u8]) -> Result<()>;

    /// Pop one entry from the head of `queue`, waiting up to `timeout` for
    /// one to appear. Returns `None` on timeout (not an error).
    async fn blocking_pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Verify the broker is reachable; called once at `EventBus::start()`.
    async fn ping(&self) -> Result<()>;
}

/// Redis-backed implementation of [`Broker`].
pub struct RedisBroker {
    manager: ConnectionManager,
}

impl RedisBroker {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Configuration(format!("invalid REDIS_URL: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::BrokerUnavailable(format!("redis connect: {e}")))?;
        info!("connected to queue broker");
        Ok(RedisBroker { manager })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn push(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .rpush(queue, payload)
            .await
            .map_err(|e| Error::BrokerUnavailable(format!("RPUSH {queue}: {e}")))?;
        Ok(())
    }

    /// `blocking_pop` is used with sub-second timeouts by the event bus's
    /// ~100ms pop-timeout cadence, which Redis's native `BLPOP` cannot
    /// express (its timeout granularity is whole seconds). This issues an
    /// immediate non-blocking `LPOP` and, on a miss, sleeps for `timeout`
    /// before returning `None` — giving the caller the same "pop or time
    /// out" contract at sub-second resolution.
    async fn blocking_pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let popped: Option<Vec<u8>> = conn
            .lpop(queue, None)
            .await
            .map_err(|e| Error::BrokerUnavailable(format!("LPOP {queue}: {e}")))?;

        match popped {
            Some(bytes) => Ok(Some(bytes)),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!(error = %e, "broker ping failed");
                Error::BrokerUnavailable(format!("PING: {e}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exercises the `Broker` trait object boundary without a live Redis
    /// instance — a minimal in-memory double mirroring the list semantics.
    struct FakeBroker {
        inner: tokio::sync::Mutex<std::collections::HashMap<String, std::collections::VecDeque<Vec<u8>>>>,
    }

    #[async_trait]
    impl Broker for FakeBroker {
        async fn push(&self, queue: &str, payload: &[u8]) -> Result<()> {
            let mut inner = self.inner.lock().await;
            inner.entry(queue.to_string()).or_default().push_back(payload.to_vec());
            Ok(())
        }

        async fn blocking_pop(&self, queue: &str, _timeout: Duration) -> Result<Option<Vec<u8>>> {
            let mut inner = self.inner.lock().await;
            Ok(inner.get_mut(queue).and_then(|q| q.pop_front()))
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fifo_ordering_is_preserved() {
        let broker = FakeBroker {
            inner: tokio::sync::Mutex::new(Default::default()),
        };
        broker.push("articles", b"one").await.unwrap();
        broker.push("articles", b"two").await.unwrap();

        let first = broker.blocking_pop("articles", Duration::from_millis(1)).await.unwrap();
        let second = broker.blocking_pop("articles", Duration::from_millis(1)).await.unwrap();

        assert_eq!(first, Some(b"one".to_vec()));
        assert_eq!(second, Some(b"two".to_vec()));
    }
}
