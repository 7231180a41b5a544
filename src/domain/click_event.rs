//! Click event message published on every successful resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::entities::NewClick;

/// A click captured on the redirect path.
///
/// Serialized as a flat JSON record and handed to the event channel keyed
/// by the client IP, so events from one client keep their relative order.
///
/// # Usage Flow
///
/// 1. Created by [`crate::application::services::Resolver`] once a code resolves
/// 2. Published without waiting by [`crate::application::services::ClickPublisher`]
/// 3. Read back by [`crate::domain::click_worker::ClickConsumer`]
/// 4. Converted to [`NewClick`] and applied idempotently via `event_id`
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    /// Idempotency key assigned by the producer.
    #[serde(default)]
    pub event_id: Option<String>,
    pub link_id: i64,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ClickEvent {
    /// Creates a new click event stamped with a fresh id and the current time.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let event = ClickEvent::new(
    ///     42,
    ///     "192.168.1.1".to_string(),
    ///     Some("Mozilla/5.0"),
    ///     Some("https://google.com"),
    /// );
    /// ```
    pub fn new(link_id: i64, ip: String, user_agent: Option<&str>, referer: Option<&str>) -> Self {
        Self {
            event_id: Some(Uuid::new_v4().to_string()),
            link_id,
            ip,
            user_agent: user_agent.map(|s| s.to_string()),
            referer: referer.map(|s| s.to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Key used by the channel for partitioning and ordering.
    pub fn partition_key(&self) -> &str {
        &self.ip
    }

    /// Converts the event into a ledger insert.
    ///
    /// Events published without an `event_id` fall back to an id derived from
    /// their channel position, which is stable across redeliveries.
    pub fn into_new_click(self, source: &str, message_id: &str) -> NewClick {
        let event_id = self
            .event_id
            .unwrap_or_else(|| derive_event_id(source, message_id));

        NewClick {
            event_id,
            link_id: self.link_id,
            client_ip: (!self.ip.is_empty()).then_some(self.ip),
            user_agent: self.user_agent,
            referer: self.referer,
            occurred_at: self.timestamp,
        }
    }
}

/// Derives a deterministic event id from a channel position.
pub fn derive_event_id(source: &str, message_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b":");
    hasher.update(message_id.as_bytes());
    hex::encode(hasher.finalize())
}
