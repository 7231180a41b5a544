//! Redis-backed resolution cache.

use super::service::{CacheError, CacheResult, CacheService};
use crate::domain::entities::ShortLink;
use async_trait::async_trait;
use redis::{AsyncCommands, Client, SetExpiry, SetOptions, aio::ConnectionManager};
use std::time::Duration;
use tracing::{debug, info};

const KEY_PREFIX: &str = "shortlink:";

fn cache_key(short_code: &str) -> String {
    format!("{KEY_PREFIX}{short_code}")
}

/// Shared cache tier for every server instance.
///
/// Each entry is the JSON-encoded [`ShortLink`] stored with a millisecond
/// `PX` expiry, so the record (including `active` and `expires_at`) is judged
/// the same way whichever tier served it. Errors go back to the caller, which
/// decides whether to fail open.
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connects to Redis and checks the connection with a PING.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ConnectionError`] if the URL is invalid, the
    /// connection cannot be established, or the PING fails.
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            CacheError::ConnectionError(format!("Failed to create Redis client: {}", e))
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        Self::from_manager(conn).await
    }

    /// Wraps a connection manager shared with other Redis users.
    pub async fn from_manager(conn: ConnectionManager) -> CacheResult<Self> {
        let cache = Self { conn };
        if !cache.health_check().await {
            return Err(CacheError::ConnectionError("Redis PING failed".to_string()));
        }

        info!("Redis cache ready");
        Ok(cache)
    }
}

#[async_trait]
impl CacheService for RedisCache {
    async fn get_link(&self, short_code: &str) -> CacheResult<Option<ShortLink>> {
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = conn.get(cache_key(short_code)).await?;

        raw.map(|bytes| serde_json::from_slice(&bytes))
            .transpose()
            .map_err(CacheError::from)
    }

    async fn set_link(&self, short_code: &str, link: &ShortLink, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_vec(link)?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        conn.set_options::<_, _, ()>(
            cache_key(short_code),
            payload,
            SetOptions::default().with_expiration(SetExpiry::PX(ttl_ms)),
        )
        .await?;

        debug!(code = %short_code, ttl_ms, "Cached link record");
        Ok(())
    }

    async fn invalidate(&self, short_code: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let removed: u32 = conn.del(cache_key(short_code)).await?;

        debug!(code = %short_code, removed, "Invalidated cached link");
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.conn.clone();
        conn.ping::<()>().await.is_ok()
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
