//! Handler for link shortening endpoint.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use validator::Validate;

use crate::api::dto::shorten::{ShortenRequest, ShortenResponse};
use crate::error::AppError;
use crate::state::AppState;

/// Creates a short link for a URL.
///
/// # Endpoint
///
/// `POST /shorten`
///
/// # Request Body
///
/// ```json
/// { "url": "https://example.com/some/page", "expires_at": "2030-01-01T00:00:00Z" }
/// ```
///
/// `expires_at` is optional.
///
/// # Response
///
/// `201 Created`
///
/// ```json
/// {
///   "short_url": "http://localhost:3000/r/aB3xY9",
///   "code": "aB3xY9",
///   "original_url": "https://example.com/some/page"
/// }
/// ```
///
/// # Errors
///
/// Returns 400 Bad Request if the body is malformed or `url` is empty,
/// not absolute, or not http(s).
pub async fn shorten_handler(
    State(state): State<AppState>,
    payload: Result<Json<ShortenRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ShortenResponse>), AppError> {
    let Json(request) = payload?;
    request.validate()?;

    let link = state
        .link_service
        .create_short_link(&request.url, request.expires_at)
        .await?;

    let short_url = state.link_service.short_url(&link.short_code);
    Ok((
        StatusCode::CREATED,
        Json(ShortenResponse::new(link, short_url)),
    ))
}
