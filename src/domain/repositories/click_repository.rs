//! Repository trait for the click ledger.

use crate::domain::entities::{ClickOutcome, DeadLetter, LedgerSummary, NewClick};
use crate::error::AppError;
use async_trait::async_trait;

/// Persistence for consumed click events.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgClickRepository`] - PostgreSQL implementation
/// - [`crate::infrastructure::persistence::InMemoryLinkStore`] - In-process implementation
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClickRepository: Send + Sync {
    /// Applies a click exactly once per `event_id`.
    ///
    /// Inserting the ledger row and incrementing the link counter happen
    /// together: either both take effect or neither does. A repeated
    /// `event_id` yields [`ClickOutcome::Duplicate`] and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] on database errors. Clicks for links
    /// that no longer exist are reported as [`AppError::NotFound`].
    async fn apply_click(&self, click: NewClick) -> Result<ClickOutcome, AppError>;

    /// Stores a message that will not be retried any further.
    async fn record_dead_letter(&self, dead_letter: DeadLetter) -> Result<(), AppError>;

    /// Most recent dead letters, newest first.
    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>, AppError>;

    /// Aggregate counters for operators.
    async fn ledger_summary(&self) -> Result<LedgerSummary, AppError>;
}
