//! Background consumer that drains the click channel into the ledger.

use metrics::counter;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::click_event::ClickEvent;
use crate::domain::entities::{ClickOutcome, DeadLetter};
use crate::domain::event_channel::{ChannelError, Delivery, EventSubscriber};
use crate::domain::repositories::ClickRepository;
use crate::error::AppError;

/// Lifecycle of the click consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Running,
    /// Cancellation observed; finishing the in-flight message.
    Draining,
    Stopped,
}

impl ConsumerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning knobs for [`ClickConsumer`].
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Deliveries after which a failing message is dead-lettered.
    pub max_deliveries: u32,
    /// Time the in-flight message gets to finish after cancellation.
    pub drain_grace: Duration,
    /// Pause after a failed read or a failed attempt.
    pub retry_backoff: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            max_deliveries: 5,
            drain_grace: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Processed {
    /// Position committed past the message.
    Done,
    /// Left uncommitted for redelivery.
    Retry,
}

/// Single long-lived worker owning the channel's read position.
///
/// Reads one message at a time, applies it through [`ClickRepository::apply_click`]
/// and commits only after the ledger write succeeded. A message that keeps
/// failing is recorded as a [`DeadLetter`] once it reaches
/// [`ConsumerSettings::max_deliveries`], then committed.
pub struct ClickConsumer {
    subscriber: Arc<dyn EventSubscriber>,
    clicks: Arc<dyn ClickRepository>,
    settings: ConsumerSettings,
    state: watch::Sender<ConsumerState>,
}

/// Handle to a spawned [`ClickConsumer`].
pub struct ConsumerHandle {
    state: watch::Receiver<ConsumerState>,
    join: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Receiver that observes state transitions.
    pub fn watch(&self) -> watch::Receiver<ConsumerState> {
        self.state.clone()
    }

    /// Waits for the consumer task to finish.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            error!(error = %e, "Click consumer task failed");
        }
    }
}

impl ClickConsumer {
    pub fn new(
        subscriber: Arc<dyn EventSubscriber>,
        clicks: Arc<dyn ClickRepository>,
        settings: ConsumerSettings,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Running);
        Self {
            subscriber,
            clicks,
            settings,
            state,
        }
    }

    /// Starts the consumer on the runtime. It runs until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> ConsumerHandle {
        let state = self.state.subscribe();
        let join = tokio::spawn(self.run(cancel));
        ConsumerHandle { state, join }
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            max_deliveries = self.settings.max_deliveries,
            "Click consumer started"
        );

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                read = self.subscriber.read_next() => read,
            };

            let delivery = match read {
                Ok(Some(delivery)) => delivery,
                Ok(None) => continue,
                Err(ChannelError::Closed) => {
                    warn!("Click channel closed underneath the consumer");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Click read failed; retrying");
                    if self.pause(&cancel).await {
                        break;
                    }
                    continue;
                }
            };

            let processing = self.process(&delivery);
            tokio::pin!(processing);

            let outcome = tokio::select! {
                biased;
                outcome = &mut processing => outcome,
                _ = cancel.cancelled() => {
                    self.set_state(ConsumerState::Draining);
                    match tokio::time::timeout(self.settings.drain_grace, &mut processing).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(
                                source = %delivery.source,
                                id = %delivery.id,
                                "Drain grace elapsed; message left for redelivery"
                            );
                            break;
                        }
                    }
                }
            };

            if outcome == Processed::Retry && self.pause(&cancel).await {
                break;
            }
        }

        self.set_state(ConsumerState::Draining);
        self.subscriber.close().await;
        self.set_state(ConsumerState::Stopped);
        info!("Click consumer stopped");
    }

    /// Sleeps for the retry backoff. Returns `true` if cancelled meanwhile.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(self.settings.retry_backoff) => false,
        }
    }

    async fn process(&self, delivery: &Delivery) -> Processed {
        let event: ClickEvent = match serde_json::from_slice(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                return self
                    .dead_letter(delivery, format!("malformed payload: {}", e))
                    .await;
            }
        };

        let link_id = event.link_id;
        let click = event.into_new_click(&delivery.source, &delivery.id);

        match self.clicks.apply_click(click).await {
            Ok(ClickOutcome::Applied) => {
                counter!("clicks_applied_total").increment(1);
                debug!(link_id, id = %delivery.id, "Click applied");
                self.commit(delivery).await
            }
            Ok(ClickOutcome::Duplicate) => {
                counter!("clicks_duplicate_total").increment(1);
                debug!(link_id, id = %delivery.id, "Duplicate click skipped");
                self.commit(delivery).await
            }
            Err(AppError::NotFound { .. }) => {
                self.dead_letter(delivery, format!("link {} does not exist", link_id))
                    .await
            }
            Err(e) if delivery.delivery_count >= self.settings.max_deliveries => {
                self.dead_letter(
                    delivery,
                    format!("gave up after {} deliveries: {}", delivery.delivery_count, e),
                )
                .await
            }
            Err(e) => {
                warn!(
                    link_id,
                    source = %delivery.source,
                    id = %delivery.id,
                    attempt = delivery.delivery_count,
                    error = %e,
                    "Failed to apply click; will retry"
                );
                Processed::Retry
            }
        }
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: String) -> Processed {
        warn!(
            source = %delivery.source,
            id = %delivery.id,
            reason = %reason,
            "Dead-lettering click message"
        );

        let dead_letter = DeadLetter {
            source: delivery.source.clone(),
            message_id: delivery.id.clone(),
            payload: delivery.payload_lossy(),
            reason,
            attempts: delivery.delivery_count as i32,
        };

        match self.clicks.record_dead_letter(dead_letter).await {
            Ok(()) => {
                counter!("clicks_dead_lettered_total").increment(1);
                self.commit(delivery).await
            }
            Err(e) => {
                error!(id = %delivery.id, error = %e, "Failed to record dead letter");
                Processed::Retry
            }
        }
    }

    async fn commit(&self, delivery: &Delivery) -> Processed {
        match self.subscriber.commit(delivery).await {
            Ok(()) => Processed::Done,
            Err(e) => {
                warn!(id = %delivery.id, error = %e, "Commit failed; message will be redelivered");
                Processed::Retry
            }
        }
    }
}
