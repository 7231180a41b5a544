//! DTOs for link shortening endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use validator::Validate;

use crate::domain::entities::ShortLink;

/// Request to shorten a URL.
#[derive(Debug, Deserialize, Validate)]
pub struct ShortenRequest {
    /// The destination URL (absolute http or https).
    #[validate(length(min = 1, max = 8192, message = "URL is required"))]
    pub url: String,

    /// Optional expiry timestamp (RFC 3339). After this time, the link returns 410 Gone.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Created short link.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize)]
pub struct ShortenResponse {
    pub short_url: String,
    pub code: String,
    pub original_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ShortenResponse {
    pub fn new(link: ShortLink, short_url: String) -> Self {
        Self {
            short_url,
            code: link.short_code,
            original_url: link.original_url,
            expires_at: link.expires_at,
        }
    }
}
