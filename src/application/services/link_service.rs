//! Link creation and administration service.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::entities::{NewLink, ShortLink};
use crate::domain::repositories::LinkRepository;
use crate::error::AppError;
use crate::infrastructure::cache::CacheService;
use crate::utils::code_generator::CodeGenerator;
use crate::utils::url_validator::validate_url;

/// Settings for [`LinkService`].
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Public origin used to build `short_url`, without trailing slash.
    pub base_url: String,
    /// Code candidates tried before creation gives up.
    pub max_attempts: u32,
    pub cache_ttl: Duration,
}

/// Service for creating and administering shortened links.
///
/// Collisions are detected by the store's uniqueness constraint; each
/// [`AppError::Conflict`] triggers a fresh code until `max_attempts` runs out.
pub struct LinkService {
    links: Arc<dyn LinkRepository>,
    cache: Arc<dyn CacheService>,
    codes: Arc<dyn CodeGenerator>,
    settings: LinkSettings,
}

impl LinkService {
    /// Creates a new link service.
    pub fn new(
        links: Arc<dyn LinkRepository>,
        cache: Arc<dyn CacheService>,
        codes: Arc<dyn CodeGenerator>,
        settings: LinkSettings,
    ) -> Self {
        Self {
            links,
            cache,
            codes,
            settings,
        }
    }

    /// Creates an anonymous short link.
    ///
    /// The destination is stored exactly as submitted (after trimming), so
    /// resolving the code yields the same string.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] if the URL is empty, malformed or not
    /// http(s). Returns [`AppError::Internal`] if every code candidate
    /// collided or the store failed.
    pub async fn create_short_link(
        &self,
        url: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ShortLink, AppError> {
        let url = validate_url(url).map_err(|e| {
            AppError::bad_request("Invalid URL", json!({ "url": e.to_string() }))
        })?;

        let attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=attempts {
            let code = self.codes.generate();
            let draft = NewLink::new(url, code.clone()).with_expiry(expires_at);

            match self.links.create(draft).await {
                Ok(link) => {
                    self.prewarm(&link).await;
                    return Ok(link);
                }
                Err(e) if e.is_conflict() => {
                    debug!(attempt, code = %code, "Short code collision; retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(attempts, "Giving up on short code generation");
        Err(AppError::internal(
            "Failed to generate unique code",
            json!({ "reason": "Too many collisions", "attempts": attempts }),
        ))
    }

    /// Builds the public short URL for a code.
    pub fn short_url(&self, code: &str) -> String {
        format!("{}/r/{}", self.settings.base_url.trim_end_matches('/'), code)
    }

    /// Reads a link straight from the store.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if no link has this code.
    pub async fn get_link(&self, code: &str) -> Result<ShortLink, AppError> {
        self.links
            .find_by_code(code)
            .await?
            .ok_or_else(|| not_found(code))
    }

    /// Enables or disables a link and drops its cache entry.
    pub async fn set_active(&self, code: &str, active: bool) -> Result<ShortLink, AppError> {
        let link = self
            .links
            .set_active(code, active)
            .await?
            .ok_or_else(|| not_found(code))?;

        self.invalidate(code).await;
        Ok(link)
    }

    /// Changes or clears a link's expiry and drops its cache entry.
    pub async fn set_expiry(
        &self,
        code: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ShortLink, AppError> {
        let link = self
            .links
            .set_expiry(code, expires_at)
            .await?
            .ok_or_else(|| not_found(code))?;

        self.invalidate(code).await;
        Ok(link)
    }

    async fn prewarm(&self, link: &ShortLink) {
        if let Err(e) = self
            .cache
            .set_link(&link.short_code, link, self.settings.cache_ttl)
            .await
        {
            warn!(code = %link.short_code, error = %e, "Failed to pre-warm cache");
        }
    }

    async fn invalidate(&self, code: &str) {
        if let Err(e) = self.cache.invalidate(code).await {
            warn!(code = %code, error = %e, "Failed to invalidate cache entry; it expires with its TTL");
        }
    }
}

fn not_found(code: &str) -> AppError {
    AppError::not_found("Short link not found", json!({ "code": code }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::MockLinkRepository;
    use crate::infrastructure::cache::{MemoryCache, NullCache};
    use crate::utils::code_generator::MockCodeGenerator;
    use std::sync::Mutex;

    fn settings() -> LinkSettings {
        LinkSettings {
            base_url: "http://sho.rt/".to_string(),
            max_attempts: 3,
            cache_ttl: Duration::from_secs(60),
        }
    }

    fn create_test_link(id: i64, code: &str, url: &str) -> ShortLink {
        ShortLink {
            id,
            original_url: url.to_string(),
            short_code: code.to_string(),
            owner: None,
            clicks: 0,
            created_at: Utc::now(),
            expires_at: None,
            active: true,
        }
    }

    fn sequence(codes: &[&str]) -> MockCodeGenerator {
        let queue = Mutex::new(codes.iter().map(|c| c.to_string()).collect::<Vec<_>>());
        let mut generator = MockCodeGenerator::new();
        generator
            .expect_generate()
            .returning(move || queue.lock().unwrap().remove(0));
        generator
    }

    #[tokio::test]
    async fn test_create_short_link_success() {
        let mut mock_link_repo = MockLinkRepository::new();
        mock_link_repo
            .expect_create()
            .withf(|draft| {
                draft.original_url == "https://example.com/a?b=1"
                    && draft.short_code == "abc123"
                    && draft.active
                    && draft.owner.is_none()
            })
            .times(1)
            .returning(|draft| Ok(create_test_link(10, &draft.short_code, &draft.original_url)));

        let cache = Arc::new(MemoryCache::default());
        let service = LinkService::new(
            Arc::new(mock_link_repo),
            cache.clone(),
            Arc::new(sequence(&["abc123"])),
            settings(),
        );

        let link = service
            .create_short_link("  https://example.com/a?b=1 ", None)
            .await
            .unwrap();

        assert_eq!(link.original_url, "https://example.com/a?b=1");
        assert_eq!(service.short_url(&link.short_code), "http://sho.rt/r/abc123");
        assert!(cache.get_link("abc123").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_retries_on_conflict() {
        let mut mock_link_repo = MockLinkRepository::new();
        mock_link_repo
            .expect_create()
            .withf(|draft| draft.short_code == "taken1")
            .times(1)
            .returning(|_| Err(AppError::conflict("Unique constraint violation", json!({}))));
        mock_link_repo
            .expect_create()
            .withf(|draft| draft.short_code == "free22")
            .times(1)
            .returning(|draft| Ok(create_test_link(11, &draft.short_code, &draft.original_url)));

        let service = LinkService::new(
            Arc::new(mock_link_repo),
            Arc::new(NullCache::new()),
            Arc::new(sequence(&["taken1", "free22"])),
            settings(),
        );

        let link = service
            .create_short_link("https://example.com", None)
            .await
            .unwrap();
        assert_eq!(link.short_code, "free22");
    }

    #[tokio::test]
    async fn test_create_gives_up_after_max_attempts() {
        let mut mock_link_repo = MockLinkRepository::new();
        mock_link_repo
            .expect_create()
            .times(3)
            .returning(|_| Err(AppError::conflict("Unique constraint violation", json!({}))));

        let service = LinkService::new(
            Arc::new(mock_link_repo),
            Arc::new(NullCache::new()),
            Arc::new(sequence(&["a", "b", "c"])),
            settings(),
        );

        let err = service
            .create_short_link("https://example.com", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal { .. }));
    }

    #[tokio::test]
    async fn test_create_short_link_invalid_url() {
        let mut mock_link_repo = MockLinkRepository::new();
        mock_link_repo.expect_create().times(0);

        let service = LinkService::new(
            Arc::new(mock_link_repo),
            Arc::new(NullCache::new()),
            Arc::new(sequence(&[])),
            settings(),
        );

        for url in ["", "not-a-url", "ftp://example.com"] {
            let err = service.create_short_link(url, None).await.unwrap_err();
            assert!(matches!(err, AppError::Validation { .. }), "{url}");
        }
    }

    #[tokio::test]
    async fn test_store_error_is_not_retried() {
        let mut mock_link_repo = MockLinkRepository::new();
        mock_link_repo
            .expect_create()
            .times(1)
            .returning(|_| Err(AppError::internal("Database error", json!({}))));

        let service = LinkService::new(
            Arc::new(mock_link_repo),
            Arc::new(NullCache::new()),
            Arc::new(sequence(&["abc123"])),
            settings(),
        );

        let err = service
            .create_short_link("https://example.com", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal { .. }));
    }

    #[tokio::test]
    async fn test_set_active_invalidates_cache() {
        let mut mock_link_repo = MockLinkRepository::new();
        mock_link_repo
            .expect_set_active()
            .withf(|code, active| code == "abc123" && !*active)
            .times(1)
            .returning(|code, active| {
                let mut link = create_test_link(1, code, "https://example.com");
                link.active = active;
                Ok(Some(link))
            });

        let cache = Arc::new(MemoryCache::default());
        cache
            .set_link(
                "abc123",
                &create_test_link(1, "abc123", "https://example.com"),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let service = LinkService::new(
            Arc::new(mock_link_repo),
            cache.clone(),
            Arc::new(sequence(&[])),
            settings(),
        );

        let link = service.set_active("abc123", false).await.unwrap();
        assert!(!link.active);
        assert!(cache.get_link("abc123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_expiry_unknown_code() {
        let mut mock_link_repo = MockLinkRepository::new();
        mock_link_repo
            .expect_set_expiry()
            .returning(|_, _| Ok(None));

        let service = LinkService::new(
            Arc::new(mock_link_repo),
            Arc::new(NullCache::new()),
            Arc::new(sequence(&[])),
            settings(),
        );

        let err = service.set_expiry("nope", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }
}
