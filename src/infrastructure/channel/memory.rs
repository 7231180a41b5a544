//! In-process event channel.
//!
//! Mirrors the Redis Streams channel semantics (per-key partitions,
//! head-of-line redelivery until commit, delivery counting) without
//! durability. Used in tests and as a fallback when Redis is not configured.
//!
//! Each partition holds at most `max_len` uncommitted records. A publish to
//! a full partition is rejected, so a stalled consumer costs dropped clicks
//! rather than unbounded memory.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

use crate::domain::event_channel::{
    ChannelError, ChannelResult, Delivery, EventPublisher, EventSubscriber, partition_for,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-partition cap used by [`MemoryChannel::new`].
pub const DEFAULT_MAX_LEN: usize = 100_000;

#[derive(Debug)]
struct Record {
    seq: u64,
    payload: Vec<u8>,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct Partition {
    /// Uncommitted records; the front is the next to deliver.
    log: VecDeque<Record>,
    next_seq: u64,
}

#[derive(Debug)]
struct Inner {
    name: String,
    max_len: usize,
    partitions: Mutex<Vec<Partition>>,
    cursor: Mutex<usize>,
    notify: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Vec<Partition>> {
        self.partitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn source(&self, partition: usize) -> String {
        format!("{}:{}", self.name, partition)
    }

    /// Hands out the head of the next non-empty partition, round-robin.
    fn try_next(&self) -> Option<Delivery> {
        let mut partitions = self.lock();
        let count = partitions.len();
        let mut cursor = self.cursor.lock().unwrap_or_else(|p| p.into_inner());

        for step in 0..count {
            let index = (*cursor + step) % count;
            if let Some(record) = partitions[index].log.front_mut() {
                record.deliveries += 1;
                *cursor = (index + 1) % count;
                return Some(Delivery {
                    source: self.source(index),
                    id: record.seq.to_string(),
                    payload: record.payload.clone(),
                    delivery_count: record.deliveries,
                });
            }
        }

        None
    }
}

/// Shared in-memory log. Clones refer to the same log.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    inner: Arc<Inner>,
    poll_interval: Duration,
}

impl MemoryChannel {
    /// Creates a channel named `name` with `partitions` partitions of at
    /// most [`DEFAULT_MAX_LEN`] records each.
    pub fn new(name: impl Into<String>, partitions: u32) -> Self {
        Self::with_capacity(name, partitions, DEFAULT_MAX_LEN)
    }

    /// Creates a channel whose partitions each hold at most `max_len`
    /// uncommitted records.
    pub fn with_capacity(name: impl Into<String>, partitions: u32, max_len: usize) -> Self {
        let partitions = (0..partitions.max(1)).map(|_| Partition::default()).collect();

        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                max_len: max_len.max(1),
                partitions: Mutex::new(partitions),
                cursor: Mutex::new(0),
                notify: Notify::new(),
            }),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets how long an idle `read_next` waits before returning `None`.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Opens a subscriber on the shared group position.
    ///
    /// A second subscriber opened after the first was dropped resumes from
    /// the last committed position, the way a restarted consumer would.
    pub fn subscribe(&self) -> MemorySubscriber {
        MemorySubscriber {
            inner: self.inner.clone(),
            poll_interval: self.poll_interval,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of uncommitted messages across all partitions.
    pub fn pending(&self) -> usize {
        self.inner.lock().iter().map(|p| p.log.len()).sum()
    }

    /// Partition index a key maps to.
    pub fn partition_of(&self, key: &str) -> u32 {
        partition_for(key, self.inner.lock().len() as u32)
    }
}

#[async_trait]
impl EventPublisher for MemoryChannel {
    async fn publish(&self, key: &str, payload: &[u8]) -> ChannelResult<()> {
        let index = self.partition_of(key) as usize;
        {
            let mut partitions = self.inner.lock();
            let partition = &mut partitions[index];
            if partition.log.len() >= self.inner.max_len {
                return Err(ChannelError::Operation(format!(
                    "partition {} is full ({} uncommitted)",
                    self.inner.source(index),
                    partition.log.len()
                )));
            }
            let seq = partition.next_seq;
            partition.next_seq += 1;
            partition.log.push_back(Record {
                seq,
                payload: payload.to_vec(),
                deliveries: 0,
            });
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

/// Subscriber handle over a [`MemoryChannel`].
#[derive(Debug)]
pub struct MemorySubscriber {
    inner: Arc<Inner>,
    poll_interval: Duration,
    closed: AtomicBool,
}

#[async_trait]
impl EventSubscriber for MemorySubscriber {
    async fn read_next(&self) -> ChannelResult<Option<Delivery>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }

        // Registered before checking so a publish in between is not missed.
        let notified = self.inner.notify.notified();
        if let Some(delivery) = self.inner.try_next() {
            return Ok(Some(delivery));
        }

        let _ = tokio::time::timeout(self.poll_interval, notified).await;
        Ok(self.inner.try_next())
    }

    async fn commit(&self, delivery: &Delivery) -> ChannelResult<()> {
        let index = delivery
            .source
            .rsplit(':')
            .next()
            .and_then(|p| p.parse::<usize>().ok())
            .ok_or_else(|| ChannelError::Operation(format!("unknown source {}", delivery.source)))?;
        let seq = delivery
            .id
            .parse::<u64>()
            .map_err(|_| ChannelError::Operation(format!("invalid message id {}", delivery.id)))?;

        let mut partitions = self.inner.lock();
        let partition = partitions
            .get_mut(index)
            .ok_or_else(|| ChannelError::Operation(format!("unknown source {}", delivery.source)))?;

        if partition.log.front().is_some_and(|r| r.seq == seq) {
            partition.log.pop_front();
        } else {
            debug!(source = %delivery.source, id = %delivery.id, "Commit for a message that is no longer pending");
        }

        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        debug!(channel = %self.inner.name, "Memory subscriber closed");
    }
}
