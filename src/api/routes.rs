//! API route configuration.

use crate::api::handlers::{
    health_handler, missing_code_handler, redirect_handler, shorten_handler,
};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// Public routes.
///
/// # Endpoints
///
/// - `POST /shorten`    - Create a short link
/// - `GET  /r/{code}`   - Redirect to the destination (302)
/// - `GET  /r`          - Rejected with 400 (no code)
/// - `GET  /health`     - Component health
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/shorten", post(shorten_handler))
        .route("/r", get(missing_code_handler))
        .route("/r/{code}", get(redirect_handler))
        .route("/health", get(health_handler))
}
