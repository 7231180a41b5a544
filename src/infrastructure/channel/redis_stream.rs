//! Redis Streams event channel.
//!
//! Each partition is a stream named `{prefix}:{n}`. Producers `XADD` to the
//! stream chosen by hashing the partition key; the consumer reads through a
//! consumer group and acknowledges (`XACK`) only after the click is stored.
//! Unacknowledged entries stay in the group's pending list and are read
//! again ahead of new entries.

use async_trait::async_trait;
use redis::streams::{
    StreamMaxlen, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client, RedisError, aio::ConnectionManager};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::event_channel::{
    ChannelError, ChannelResult, Delivery, EventPublisher, EventSubscriber, partition_for,
};

const PAYLOAD_FIELD: &str = "payload";
const KEY_FIELD: &str = "key";

/// Stream layout and consumer group settings.
#[derive(Debug, Clone)]
pub struct RedisStreamConfig {
    pub prefix: String,
    pub partitions: u32,
    /// Approximate cap applied on every `XADD`.
    pub max_len: usize,
    pub group: String,
    pub consumer: String,
    /// How long a `XREADGROUP` waits for new entries.
    pub block: Duration,
}

impl RedisStreamConfig {
    pub fn stream_key(&self, partition: u32) -> String {
        format!("{}:{}", self.prefix, partition)
    }

    pub fn stream_keys(&self) -> Vec<String> {
        (0..self.partitions.max(1))
            .map(|p| self.stream_key(p))
            .collect()
    }
}

fn map_redis_error(e: RedisError) -> ChannelError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
        ChannelError::Unavailable(e.to_string())
    } else {
        ChannelError::Operation(e.to_string())
    }
}

async fn connect_manager(redis_url: &str) -> ChannelResult<ConnectionManager> {
    let client = Client::open(redis_url).map_err(|e| {
        ChannelError::Unavailable(format!("Failed to create Redis client: {}", e))
    })?;

    ConnectionManager::new(client)
        .await
        .map_err(|e| ChannelError::Unavailable(format!("Failed to connect to Redis: {}", e)))
}

/// Producer half of the Redis Streams channel.
#[derive(Clone)]
pub struct RedisStreamPublisher {
    conn: ConnectionManager,
    config: Arc<RedisStreamConfig>,
}

impl RedisStreamPublisher {
    pub fn new(conn: ConnectionManager, config: Arc<RedisStreamConfig>) -> Self {
        Self { conn, config }
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish(&self, key: &str, payload: &[u8]) -> ChannelResult<()> {
        let stream = self
            .config
            .stream_key(partition_for(key, self.config.partitions));
        let mut conn = self.conn.clone();

        let id: String = conn
            .xadd_maxlen(
                &stream,
                StreamMaxlen::Approx(self.config.max_len),
                "*",
                &[(KEY_FIELD, key.as_bytes()), (PAYLOAD_FIELD, payload)],
            )
            .await
            .map_err(map_redis_error)?;

        debug!(stream = %stream, id = %id, "Click event appended");
        Ok(())
    }
}

/// Consumer half of the Redis Streams channel.
///
/// Holds its own connection: blocking reads would otherwise stall commands
/// multiplexed on a shared one. [`EventSubscriber::close`] drops it.
pub struct RedisStreamSubscriber {
    conn: Mutex<Option<ConnectionManager>>,
    config: Arc<RedisStreamConfig>,
    streams: Vec<String>,
}

impl RedisStreamSubscriber {
    /// Connects and makes sure the consumer group exists on every partition.
    pub async fn connect(redis_url: &str, config: Arc<RedisStreamConfig>) -> ChannelResult<Self> {
        let conn = connect_manager(redis_url).await?;
        let subscriber = Self {
            conn: Mutex::new(Some(conn)),
            streams: config.stream_keys(),
            config,
        };
        subscriber.ensure_groups().await?;

        info!(
            group = %subscriber.config.group,
            consumer = %subscriber.config.consumer,
            partitions = subscriber.streams.len(),
            "Subscribed to click streams"
        );
        Ok(subscriber)
    }

    /// A handle on the connection, or [`ChannelError::Closed`] after close.
    fn conn(&self) -> ChannelResult<ConnectionManager> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(ChannelError::Closed)
    }

    async fn ensure_groups(&self) -> ChannelResult<()> {
        let mut conn = self.conn()?;

        for stream in &self.streams {
            let created: Result<(), RedisError> = conn
                .xgroup_create_mkstream(stream, &self.config.group, "0")
                .await;

            match created {
                Ok(()) => debug!(stream = %stream, "Consumer group created"),
                Err(e) if e.code() == Some("BUSYGROUP") => {}
                Err(e) => return Err(map_redis_error(e)),
            }
        }

        Ok(())
    }

    fn group_options(&self) -> StreamReadOptions {
        StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer)
            .count(1)
    }

    /// Re-reads this consumer's oldest unacknowledged entry, if any.
    async fn read_pending(&self) -> ChannelResult<Option<Delivery>> {
        let mut conn = self.conn()?;
        let ids = vec!["0"; self.streams.len()];

        let reply: Option<StreamReadReply> = conn
            .xread_options(&self.streams, &ids, &self.group_options())
            .await
            .map_err(map_redis_error)?;

        let Some(reply) = reply else {
            return Ok(None);
        };

        for stream in reply.keys {
            for entry in stream.ids {
                let Some(payload) = entry.get::<Vec<u8>>(PAYLOAD_FIELD) else {
                    // Trimmed away while pending; nothing left to deliver.
                    warn!(stream = %stream.key, id = %entry.id, "Dropping pending entry without payload");
                    let _: i64 = conn
                        .xack(&stream.key, &self.config.group, &[&entry.id])
                        .await
                        .map_err(map_redis_error)?;
                    continue;
                };

                let delivery_count = self.delivery_count(&stream.key, &entry.id).await;
                return Ok(Some(Delivery {
                    source: stream.key.clone(),
                    id: entry.id,
                    payload,
                    delivery_count,
                }));
            }
        }

        Ok(None)
    }

    async fn delivery_count(&self, stream: &str, id: &str) -> u32 {
        let reply: Result<StreamPendingCountReply, RedisError> = match self.conn() {
            Ok(mut conn) => {
                conn.xpending_count(stream, &self.config.group, id, id, 1)
                    .await
            }
            Err(_) => return 1,
        };

        match reply {
            Ok(reply) => reply
                .ids
                .first()
                .map(|p| p.times_delivered as u32)
                .unwrap_or(1),
            Err(e) => {
                warn!(stream = %stream, id = %id, error = %e, "XPENDING failed; assuming first delivery");
                1
            }
        }
    }

    async fn read_new(&self) -> ChannelResult<Option<Delivery>> {
        let mut conn = self.conn()?;
        let ids = vec![">"; self.streams.len()];
        let options = self
            .group_options()
            .block(self.config.block.as_millis() as usize);

        let reply: Option<StreamReadReply> = conn
            .xread_options(&self.streams, &ids, &options)
            .await
            .map_err(map_redis_error)?;

        let delivery = reply.and_then(|reply| {
            reply.keys.into_iter().find_map(|stream| {
                let key = stream.key;
                stream.ids.into_iter().find_map(|entry| {
                    entry.get::<Vec<u8>>(PAYLOAD_FIELD).map(|payload| Delivery {
                        source: key.clone(),
                        id: entry.id.clone(),
                        payload,
                        delivery_count: 1,
                    })
                })
            })
        });

        Ok(delivery)
    }
}

#[async_trait]
impl EventSubscriber for RedisStreamSubscriber {
    async fn read_next(&self) -> ChannelResult<Option<Delivery>> {
        if let Some(delivery) = self.read_pending().await? {
            return Ok(Some(delivery));
        }

        self.read_new().await
    }

    async fn commit(&self, delivery: &Delivery) -> ChannelResult<()> {
        let mut conn = self.conn()?;
        let acked: i64 = conn
            .xack(&delivery.source, &self.config.group, &[&delivery.id])
            .await
            .map_err(map_redis_error)?;

        if acked == 0 {
            debug!(stream = %delivery.source, id = %delivery.id, "Entry was already acknowledged");
        }
        Ok(())
    }

    async fn close(&self) {
        let released = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(released);
        info!(consumer = %self.config.consumer, "Click stream subscriber closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RedisStreamConfig {
        RedisStreamConfig {
            prefix: "clicks".to_string(),
            partitions: 3,
            max_len: 1000,
            group: "click-consumers".to_string(),
            consumer: "consumer-1".to_string(),
            block: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_stream_keys() {
        assert_eq!(
            config().stream_keys(),
            vec!["clicks:0", "clicks:1", "clicks:2"]
        );
    }

    #[test]
    fn test_stream_key_for_partition_key_is_stable() {
        let cfg = config();
        let a = cfg.stream_key(partition_for("198.51.100.4", cfg.partitions));
        let b = cfg.stream_key(partition_for("198.51.100.4", cfg.partitions));
        assert_eq!(a, b);
        assert!(cfg.stream_keys().contains(&a));
    }
}
