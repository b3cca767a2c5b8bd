//! Redis-backed pub/sub for multi-process deployments.
//!
//! Publishing shares one multiplexed connection, created lazily and
//! dropped after an error so the next publish reconnects. Every
//! subscription opens its own pub/sub connection; the returned stream ends
//! when that connection is lost.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::PubSub;

/// Redis implementation of the `PubSub` port.
pub struct RedisPubSub {
    client: redis::Client,
    publisher: Mutex<Option<MultiplexedConnection>>,
}

impl RedisPubSub {
    /// Creates the adapter without connecting.
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            publisher: Mutex::new(None),
        }
    }

    /// Opens a client for a `redis://` or `rediss://` URL.
    pub fn open(url: &str) -> Result<Self, DomainError> {
        let client = redis::Client::open(url).map_err(pubsub_error("open redis client"))?;
        Ok(Self::new(client))
    }

    async fn publisher_connection(&self) -> Result<MultiplexedConnection, DomainError> {
        let mut guard = self.publisher.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(pubsub_error("connect to redis"))?;
        *guard = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl PubSub for RedisPubSub {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), DomainError> {
        let mut conn = self.publisher_connection().await?;
        let result: Result<i64, redis::RedisError> = conn.publish(channel, payload).await;

        match result {
            Ok(receivers) => {
                tracing::trace!(channel, receivers, "Published to redis");
                Ok(())
            }
            Err(e) => {
                // Force a reconnect on the next publish.
                self.publisher.lock().await.take();
                Err(pubsub_error("publish")(e))
            }
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, Vec<u8>>, DomainError> {
        let mut pubsub = self
            .client
            .get_async_connection()
            .await
            .map_err(pubsub_error("open pubsub connection"))?
            .into_pubsub();
        pubsub
            .subscribe(channel)
            .await
            .map_err(pubsub_error("subscribe"))?;

        tracing::info!(channel, "Subscribed to redis channel");

        let stream = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec());
        Ok(stream.boxed())
    }
}

fn pubsub_error(action: &'static str) -> impl Fn(redis::RedisError) -> DomainError {
    move |e| DomainError::new(ErrorCode::PubSubError, format!("Failed to {}: {}", action, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_non_redis_urls() {
        let err = RedisPubSub::open("http://localhost:6379").err().unwrap();
        assert_eq!(err.code, ErrorCode::PubSubError);
    }

    #[test]
    fn open_does_not_connect() {
        // Nothing listens on this port; construction must still succeed.
        assert!(RedisPubSub::open("redis://127.0.0.1:1").is_ok());
    }

    #[tokio::test]
    async fn subscribe_reports_unreachable_server() {
        let pubsub = RedisPubSub::open("redis://127.0.0.1:1").unwrap();
        let err = pubsub.subscribe("events").await.err().unwrap();
        assert_eq!(err.code, ErrorCode::PubSubError);
        assert!(err.message.contains("open pubsub connection"));
    }
}
