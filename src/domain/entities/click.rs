//! Click ledger records and dead letters.

use chrono::{DateTime, Utc};

/// A click applied to the ledger.
///
/// `event_id` is the idempotency key: the ledger holds at most one row per
/// event, so a redelivered event never counts twice.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Click {
    pub id: i64,
    pub event_id: String,
    pub link_id: i64,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Input data for applying a click.
#[derive(Debug, Clone, PartialEq)]
pub struct NewClick {
    pub event_id: String,
    pub link_id: i64,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Result of applying a click to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The ledger row was inserted and the link counter incremented.
    Applied,
    /// The event had already been applied; nothing changed.
    Duplicate,
}

/// A channel message that could not be applied and was set aside for an operator.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DeadLetter {
    pub source: String,
    pub message_id: String,
    pub payload: String,
    pub reason: String,
    pub attempts: i32,
}

/// Aggregate counters over the click ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub links: i64,
    pub total_clicks: i64,
    pub ledger_rows: i64,
    pub dead_letters: i64,
}
