//! Cache-aside resolution of short codes.

use chrono::Utc;
use metrics::counter;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::application::services::ClickPublisher;
use crate::domain::click_event::ClickEvent;
use crate::domain::entities::{ShortLink, Unresolvable};
use crate::domain::repositories::LinkRepository;
use crate::error::AppError;
use crate::infrastructure::cache::CacheService;

/// Request metadata attached to a click.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Visitor {
    pub ip: String,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

/// Resolves short codes on the redirect path.
///
/// # Read Path
///
/// 1. Look the code up in the cache
/// 2. On a miss, or when the cache fails, read the link store
/// 3. Backfill the cache with whatever the store returned
/// 4. Check resolvability on the record, regardless of which tier served it
/// 5. Publish a click event without waiting for it
///
/// Cache failures never fail a request. A cached record stays authoritative
/// until its TTL runs out, so state changes made elsewhere become visible
/// within one TTL window.
pub struct Resolver {
    links: Arc<dyn LinkRepository>,
    cache: Arc<dyn CacheService>,
    clicks: ClickPublisher,
    cache_ttl: Duration,
}

impl Resolver {
    pub fn new(
        links: Arc<dyn LinkRepository>,
        cache: Arc<dyn CacheService>,
        clicks: ClickPublisher,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            links,
            cache,
            clicks,
            cache_ttl,
        }
    }

    /// Resolves `code` and records a click for `visitor`.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if no link has this code
    /// - [`AppError::Gone`] if the link is inactive or expired
    /// - [`AppError::Internal`] if the link store cannot be read
    pub async fn resolve_and_record(
        &self,
        code: &str,
        visitor: Visitor,
    ) -> Result<ShortLink, AppError> {
        let link = self.resolve(code).await?;
        self.record_click(&link, visitor);

        Ok(link)
    }

    /// Publishes a click for a link that was already resolved.
    ///
    /// Callers that can still fail after resolving should call this only once
    /// the redirect is certain to be served.
    pub fn record_click(&self, link: &ShortLink, visitor: Visitor) {
        self.clicks.publish(ClickEvent::new(
            link.id,
            visitor.ip,
            visitor.user_agent.as_deref(),
            visitor.referer.as_deref(),
        ));
    }

    /// Resolves `code` without recording a click.
    pub async fn resolve(&self, code: &str) -> Result<ShortLink, AppError> {
        let link = self.lookup(code).await?.ok_or_else(|| {
            AppError::not_found("Short link not found", json!({ "code": code }))
        })?;

        match link.check_resolvable_at(Utc::now()) {
            Ok(()) => Ok(link),
            Err(Unresolvable::Inactive) => Err(AppError::gone(
                "Link is inactive",
                json!({ "code": code }),
            )),
            Err(Unresolvable::Expired) => Err(AppError::gone(
                "Link has expired",
                json!({ "code": code, "expired_at": link.expires_at }),
            )),
        }
    }

    async fn lookup(&self, code: &str) -> Result<Option<ShortLink>, AppError> {
        match self.cache.get_link(code).await {
            Ok(Some(link)) => {
                counter!("cache_hits_total").increment(1);
                debug!(code = %code, "Cache HIT");
                return Ok(Some(link));
            }
            Ok(None) => {
                counter!("cache_misses_total").increment(1);
                debug!(code = %code, "Cache MISS");
            }
            Err(e) => {
                counter!("cache_errors_total").increment(1);
                warn!(code = %code, error = %e, "Cache lookup failed; falling back to store");
            }
        }

        let link = self.links.find_by_code(code).await?;

        if let Some(link) = &link
            && let Err(e) = self.cache.set_link(code, link, self.cache_ttl).await
        {
            warn!(code = %code, error = %e, "Cache backfill failed");
        }

        Ok(link)
    }
}
