//! Cache service trait and error types.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::entities::ShortLink;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    ConnectionError(String),
    #[error("Cache operation error: {0}")]
    OperationError(String),
    #[error("Cache serialization error: {0}")]
    SerializationError(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
            Self::ConnectionError(e.to_string())
        } else {
            Self::OperationError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Resolution cache: short code to a mirrored [`ShortLink`] record.
///
/// Entries are disposable copies of store state. Implementations report
/// failures as errors and leave the fail-open decision to the caller: the
/// resolver treats any error like a miss.
///
/// # Implementations
///
/// - [`crate::infrastructure::cache::RedisCache`] - Redis-backed cache shared across instances
/// - [`crate::infrastructure::cache::MemoryCache`] - In-process cache for single-node setups
/// - [`crate::infrastructure::cache::NullCache`] - No-op implementation for disabled caching
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Looks up the cached record for a short code.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(link))` on cache hit, whether or not the link is resolvable
    /// - `Ok(None)` on cache miss
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the cache tier cannot be reached or the
    /// stored value cannot be decoded.
    async fn get_link(&self, short_code: &str) -> CacheResult<Option<ShortLink>>;

    /// Stores a record for `ttl`.
    async fn set_link(&self, short_code: &str, link: &ShortLink, ttl: Duration) -> CacheResult<()>;

    /// Removes a cached record.
    ///
    /// Used when a link is disabled or its expiry changes.
    async fn invalidate(&self, short_code: &str) -> CacheResult<()>;

    /// Checks if the cache backend is healthy.
    ///
    /// Used by health check endpoints to report cache status.
    async fn health_check(&self) -> bool;

    /// Backend name reported by the health endpoint.
    fn name(&self) -> &'static str;
}
