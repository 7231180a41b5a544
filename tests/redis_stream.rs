//! Redis Streams channel tests. Run with a Redis server:
//! `REDIS_URL=redis://... cargo test -- --ignored`

use redis::AsyncCommands;
use redis::streams::StreamPendingCountReply;
use shortlink_relay::domain::event_channel::{ChannelError, EventPublisher, EventSubscriber};
use shortlink_relay::infrastructure::channel::{
    RedisStreamConfig, RedisStreamPublisher, RedisStreamSubscriber,
};
use shortlink_relay::server::connect_redis;
use std::sync::Arc;
use std::time::Duration;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn stream_config() -> Arc<RedisStreamConfig> {
    Arc::new(RedisStreamConfig {
        prefix: format!("test-clicks-{}", uuid::Uuid::new_v4().simple()),
        partitions: 1,
        max_len: 1000,
        group: "click-consumers".to_string(),
        consumer: "consumer-1".to_string(),
        block: Duration::from_millis(100),
    })
}

#[tokio::test]
#[ignore = "requires REDIS_URL"]
async fn test_unacked_entry_is_redelivered_before_newer_entries() {
    let config = stream_config();
    let stream = config.stream_key(0);
    let mut conn = connect_redis(&redis_url()).await.unwrap();

    let publisher = RedisStreamPublisher::new(conn.clone(), config.clone());
    let subscriber = RedisStreamSubscriber::connect(&redis_url(), config.clone())
        .await
        .unwrap();

    publisher.publish("198.51.100.1", b"first").await.unwrap();
    let first = subscriber.read_next().await.unwrap().unwrap();
    assert_eq!(first.payload, b"first");
    assert_eq!(first.delivery_count, 1);

    // Left unacknowledged while a newer entry arrives.
    publisher.publish("198.51.100.1", b"second").await.unwrap();

    let again = subscriber.read_next().await.unwrap().unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.payload, b"first");
    assert_eq!(again.delivery_count, 2);

    subscriber.commit(&again).await.unwrap();
    let pending: StreamPendingCountReply = conn
        .xpending_count(&stream, &config.group, "-", "+", 10)
        .await
        .unwrap();
    assert!(pending.ids.iter().all(|p| p.id != first.id));

    let second = subscriber.read_next().await.unwrap().unwrap();
    assert_eq!(second.payload, b"second");
    assert_eq!(second.delivery_count, 1);
    subscriber.commit(&second).await.unwrap();

    let pending: StreamPendingCountReply = conn
        .xpending_count(&stream, &config.group, "-", "+", 10)
        .await
        .unwrap();
    assert!(pending.ids.is_empty());
    assert!(subscriber.read_next().await.unwrap().is_none());

    let _: i64 = conn.del(&stream).await.unwrap();
}

#[tokio::test]
#[ignore = "requires REDIS_URL"]
async fn test_closed_subscriber_refuses_reads() {
    let config = stream_config();
    let mut conn = connect_redis(&redis_url()).await.unwrap();
    let subscriber = RedisStreamSubscriber::connect(&redis_url(), config.clone())
        .await
        .unwrap();

    subscriber.close().await;

    assert!(matches!(
        subscriber.read_next().await,
        Err(ChannelError::Closed)
    ));

    let _: i64 = conn.del(config.stream_key(0)).await.unwrap();
}
