//! Handlers for short URL redirect.

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::net::SocketAddr;

use crate::application::services::Visitor;
use crate::error::AppError;
use crate::state::AppState;
use crate::utils::client_ip::client_ip;
use crate::utils::code_generator::validate_code;

/// Redirects a short code to its original URL.
///
/// # Endpoint
///
/// `GET /r/{code}`
///
/// # Request Flow
///
/// 1. Validate the code shape
/// 2. Resolve through the cache, falling back to the store
/// 3. Build the Location header
/// 4. Publish a click event without waiting for it
/// 5. Return 302 Found
///
/// # Errors
///
/// - 400 Bad Request if the code is malformed
/// - 404 Not Found if the short code doesn't exist
/// - 410 Gone if the link is inactive or expired
pub async fn redirect_handler(
    Path(code): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Response, AppError> {
    validate_code(&code)?;

    let visitor = Visitor {
        ip: client_ip(&headers, addr, state.behind_proxy),
        user_agent: header_text(&headers, header::USER_AGENT),
        referer: header_text(&headers, header::REFERER),
    };

    let link = state.resolver.resolve(&code).await?;

    let location = HeaderValue::from_str(&link.original_url).map_err(|_| {
        AppError::internal(
            "Stored URL is not a valid Location header",
            json!({ "code": code }),
        )
    })?;

    state.resolver.record_click(&link, visitor);

    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

/// `GET /r` without a code.
pub async fn missing_code_handler() -> AppError {
    AppError::bad_request("Short code is required", json!({}))
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
