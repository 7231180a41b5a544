//! Short link entity: the durable short code → destination mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Why a stored link cannot currently be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolvable {
    Inactive,
    Expired,
}

/// A shortened URL record.
///
/// The same type is persisted in the store and serialized into the
/// resolution cache, so the resolvability check reads the same fields
/// whichever tier served the record.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShortLink {
    pub id: i64,
    pub original_url: String,
    pub short_code: String,
    pub owner: Option<i64>,
    pub clicks: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl ShortLink {
    /// Returns true if `expires_at` is set and not in the future relative to `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| e <= now)
    }

    /// Returns true if the link has passed its expiry time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Checks resolvability at a given instant.
    ///
    /// A link resolves iff it is active and either never expires or
    /// expires strictly after `now`. Inactivity is reported first.
    pub fn check_resolvable_at(&self, now: DateTime<Utc>) -> Result<(), Unresolvable> {
        if !self.active {
            return Err(Unresolvable::Inactive);
        }
        if self.is_expired_at(now) {
            return Err(Unresolvable::Expired);
        }
        Ok(())
    }

    pub fn is_resolvable_at(&self, now: DateTime<Utc>) -> bool {
        self.check_resolvable_at(now).is_ok()
    }

    pub fn is_resolvable(&self) -> bool {
        self.is_resolvable_at(Utc::now())
    }
}

/// Input data for creating a new link.
///
/// `id`, `created_at` and the click counter are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLink {
    pub original_url: String,
    pub short_code: String,
    pub owner: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl NewLink {
    /// An anonymous, active, non-expiring draft.
    pub fn new(original_url: impl Into<String>, short_code: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            short_code: short_code.into(),
            owner: None,
            expires_at: None,
            active: true,
        }
    }

    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn with_owner(mut self, owner: Option<i64>) -> Self {
        self.owner = owner;
        self
    }
}
