//! Fire-and-forget click producer.

use metrics::counter;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::domain::click_event::ClickEvent;
use crate::domain::event_channel::EventPublisher;

/// Hands click events to the event channel without making the caller wait.
///
/// Each event is sent from a detached task. The number of sends in flight is
/// capped; once the cap is reached further events are dropped and logged.
/// A failed send is dropped as well. The redirect never observes either.
#[derive(Clone)]
pub struct ClickPublisher {
    channel: Arc<dyn EventPublisher>,
    inflight: Arc<Semaphore>,
}

impl ClickPublisher {
    pub fn new(channel: Arc<dyn EventPublisher>, max_inflight: usize) -> Self {
        Self {
            channel,
            inflight: Arc::new(Semaphore::new(max_inflight.max(1))),
        }
    }

    /// Schedules `event` for publication and returns immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn publish(&self, event: ClickEvent) {
        let permit = match self.inflight.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                counter!("clicks_dropped_total", "reason" => "backpressure").increment(1);
                warn!(link_id = event.link_id, "Click publish queue saturated; dropping click");
                return;
            }
        };

        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                counter!("clicks_dropped_total", "reason" => "encode").increment(1);
                warn!(link_id = event.link_id, error = %e, "Failed to encode click event");
                return;
            }
        };

        let channel = self.channel.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match channel.publish(event.partition_key(), &payload).await {
                Ok(()) => {
                    counter!("clicks_published_total").increment(1);
                    debug!(link_id = event.link_id, "Click event published");
                }
                Err(e) => {
                    counter!("clicks_dropped_total", "reason" => "publish").increment(1);
                    warn!(link_id = event.link_id, error = %e, "Failed to publish click event");
                }
            }
        });
    }

    /// Free publish slots.
    pub fn available_slots(&self) -> usize {
        self.inflight.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event_channel::{ChannelError, ChannelResult, EventSubscriber};
    use crate::infrastructure::channel::MemoryChannel;
    use async_trait::async_trait;
    use std::time::Duration;

    async fn wait_for(channel: &MemoryChannel, expected: usize) {
        for _ in 0..200 {
            if channel.pending() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {expected} pending, got {}", channel.pending());
    }

    #[tokio::test]
    async fn test_publishes_event_keyed_by_ip() {
        let channel = MemoryChannel::new("clicks", 4).with_poll_interval(Duration::from_millis(10));
        let publisher = ClickPublisher::new(Arc::new(channel.clone()), 16);

        let event = ClickEvent::new(3, "203.0.113.1".to_string(), Some("curl/8"), None);
        publisher.publish(event.clone());
        wait_for(&channel, 1).await;

        let sub = channel.subscribe();
        let delivery = sub.read_next().await.unwrap().unwrap();
        assert_eq!(
            delivery.source,
            format!("clicks:{}", channel.partition_of("203.0.113.1"))
        );
        let decoded: ClickEvent = serde_json::from_slice(&delivery.payload).unwrap();
        assert_eq!(decoded, event);
    }

    struct FailingChannel;

    #[async_trait]
    impl EventPublisher for FailingChannel {
        async fn publish(&self, _key: &str, _payload: &[u8]) -> ChannelResult<()> {
            Err(ChannelError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let publisher = ClickPublisher::new(Arc::new(FailingChannel), 4);
        publisher.publish(ClickEvent::new(1, "10.0.0.1".to_string(), None, None));

        for _ in 0..200 {
            if publisher.available_slots() == 4 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("publish slot was not released");
    }

    /// Blocks every publish until the gate opens.
    struct StalledChannel {
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl EventPublisher for StalledChannel {
        async fn publish(&self, _key: &str, _payload: &[u8]) -> ChannelResult<()> {
            let _pass = self
                .gate
                .acquire()
                .await
                .map_err(|_| ChannelError::Closed)?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_drops_when_saturated() {
        let gate = Arc::new(Semaphore::new(0));
        let publisher = ClickPublisher::new(Arc::new(StalledChannel { gate: gate.clone() }), 2);

        for _ in 0..5 {
            publisher.publish(ClickEvent::new(1, "10.0.0.1".to_string(), None, None));
        }
        assert_eq!(publisher.available_slots(), 0);

        gate.add_permits(8);
        for _ in 0..200 {
            if publisher.available_slots() == 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("publish slots were not released");
    }
}
