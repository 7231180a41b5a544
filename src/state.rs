//! Shared application state injected into handlers.

use std::sync::Arc;
use tokio::sync::watch;

use crate::application::services::{LinkService, Resolver};
use crate::domain::click_worker::ConsumerState;
use crate::domain::repositories::LinkRepository;
use crate::infrastructure::cache::CacheService;

/// Process-wide collaborators, built once at startup.
///
/// Cloning is cheap: every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub link_service: Arc<LinkService>,
    pub resolver: Arc<Resolver>,
    pub links: Arc<dyn LinkRepository>,
    pub cache: Arc<dyn CacheService>,
    /// Lifecycle of the background click consumer.
    pub consumer_state: watch::Receiver<ConsumerState>,
    /// Trust `X-Forwarded-For` / `X-Real-IP` for the client address.
    pub behind_proxy: bool,
}
