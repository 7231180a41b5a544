//! Event channel contract: an ordered, partitioned append log with
//! commit-gated (at-least-once) consumption.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Errors raised by channel implementations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("channel unavailable: {0}")]
    Unavailable(String),
    #[error("channel operation failed: {0}")]
    Operation(String),
    #[error("channel is closed")]
    Closed,
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// A message handed to a subscriber.
///
/// The message stays redeliverable until [`EventSubscriber::commit`] is
/// called for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Partition the message was read from.
    pub source: String,
    /// Position of the message within its partition.
    pub id: String,
    pub payload: Vec<u8>,
    /// How many times this message has been handed out, including this one.
    pub delivery_count: u32,
}

impl Delivery {
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Producer side of the channel.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Appends `payload` to the partition selected by `key`.
    async fn publish(&self, key: &str, payload: &[u8]) -> ChannelResult<()>;
}

/// Consumer side of the channel. One subscriber owns the read position
/// of its group.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Returns the next message, or `None` when nothing arrived within the
    /// implementation's poll window.
    ///
    /// An uncommitted message is handed out again before newer messages of
    /// the same partition.
    async fn read_next(&self) -> ChannelResult<Option<Delivery>>;

    /// Advances the group position past `delivery`.
    async fn commit(&self, delivery: &Delivery) -> ChannelResult<()>;

    /// Stops the subscriber and releases its connection, if it holds one.
    /// Later reads fail with [`ChannelError::Closed`].
    async fn close(&self);
}

/// Maps a partition key onto `0..partitions`.
///
/// Uses SHA-256 so every producer process agrees on the mapping.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % u64::from(partitions.max(1))) as u32
}
