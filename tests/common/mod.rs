#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::ConnectInfo;
use axum_test::TestServer;
use shortlink_relay::application::services::{
    ClickPublisher, LinkService, LinkSettings, Resolver,
};
use shortlink_relay::domain::click_worker::{
    ClickConsumer, ConsumerHandle, ConsumerSettings, ConsumerState,
};
use shortlink_relay::domain::entities::{
    ClickOutcome, DeadLetter, LedgerSummary, NewClick, NewLink, ShortLink,
};
use shortlink_relay::domain::repositories::{ClickRepository, LinkRepository};
use shortlink_relay::error::AppError;
use shortlink_relay::infrastructure::cache::{
    CacheError, CacheResult, CacheService, MemoryCache,
};
use shortlink_relay::infrastructure::channel::MemoryChannel;
use shortlink_relay::infrastructure::persistence::InMemoryLinkStore;
use shortlink_relay::state::AppState;
use shortlink_relay::utils::code_generator::RandomCodeGenerator;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::Layer;

pub const PEER_ADDR: &str = "127.0.0.1:12345";

/// Injects a fixed peer address, standing in for `into_make_service_with_connect_info`.
#[derive(Clone)]
pub struct MockConnectInfoLayer(pub SocketAddr);

impl<S> Layer<S> for MockConnectInfoLayer {
    type Service = MockConnectInfoService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MockConnectInfoService {
            inner,
            addr: self.0,
        }
    }
}

#[derive(Clone)]
pub struct MockConnectInfoService<S> {
    inner: S,
    addr: SocketAddr,
}

impl<S, B> tower::Service<axum::http::Request<B>> for MockConnectInfoService<S>
where
    S: tower::Service<axum::http::Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: axum::http::Request<B>) -> Self::Future {
        req.extensions_mut().insert(ConnectInfo(self.addr));
        self.inner.call(req)
    }
}

/// Cache whose backend can be taken down and brought back.
#[derive(Default)]
pub struct SwitchableCache {
    inner: MemoryCache,
    down: AtomicBool,
}

impl SwitchableCache {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> CacheResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(CacheError::ConnectionError("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheService for SwitchableCache {
    async fn get_link(&self, code: &str) -> CacheResult<Option<ShortLink>> {
        self.check()?;
        self.inner.get_link(code).await
    }

    async fn set_link(&self, code: &str, link: &ShortLink, ttl: Duration) -> CacheResult<()> {
        self.check()?;
        self.inner.set_link(code, link, ttl).await
    }

    async fn invalidate(&self, code: &str) -> CacheResult<()> {
        self.check()?;
        self.inner.invalidate(code).await
    }

    async fn health_check(&self) -> bool {
        self.check().is_ok()
    }

    fn name(&self) -> &'static str {
        "switchable"
    }
}

/// Click ledger that fails the first `failures` applications, then delegates.
pub struct FlakyClicks {
    inner: Arc<InMemoryLinkStore>,
    remaining_failures: AtomicU32,
    failing_forever: bool,
}

impl FlakyClicks {
    pub fn failing(inner: Arc<InMemoryLinkStore>, failures: u32) -> Self {
        Self {
            inner,
            remaining_failures: AtomicU32::new(failures),
            failing_forever: false,
        }
    }

    pub fn always_failing(inner: Arc<InMemoryLinkStore>) -> Self {
        Self {
            inner,
            remaining_failures: AtomicU32::new(0),
            failing_forever: true,
        }
    }
}

#[async_trait]
impl ClickRepository for FlakyClicks {
    async fn apply_click(&self, click: NewClick) -> Result<ClickOutcome, AppError> {
        let fail = self.failing_forever
            || self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();

        if fail {
            return Err(AppError::internal(
                "Database error",
                serde_json::json!({ "reason": "simulated outage" }),
            ));
        }
        self.inner.apply_click(click).await
    }

    async fn record_dead_letter(&self, dead_letter: DeadLetter) -> Result<(), AppError> {
        self.inner.record_dead_letter(dead_letter).await
    }

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>, AppError> {
        self.inner.list_dead_letters(limit).await
    }

    async fn ledger_summary(&self) -> Result<LedgerSummary, AppError> {
        self.inner.ledger_summary().await
    }
}

/// Builder for a fully wired service on in-process backends.
pub struct TestAppBuilder {
    cache: Arc<dyn CacheService>,
    clicks: Option<Arc<dyn ClickRepository>>,
    store: Arc<InMemoryLinkStore>,
    cache_ttl: Duration,
    max_deliveries: u32,
    behind_proxy: bool,
}

impl TestAppBuilder {
    pub fn cache(mut self, cache: Arc<dyn CacheService>) -> Self {
        self.cache = cache;
        self
    }

    pub fn store(mut self, store: Arc<InMemoryLinkStore>) -> Self {
        self.store = store;
        self
    }

    pub fn clicks(mut self, clicks: Arc<dyn ClickRepository>) -> Self {
        self.clicks = Some(clicks);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries;
        self
    }

    pub fn behind_proxy(mut self) -> Self {
        self.behind_proxy = true;
        self
    }

    pub fn build(self) -> TestApp {
        let channel = MemoryChannel::new("clicks", 4).with_poll_interval(Duration::from_millis(10));
        let links: Arc<dyn LinkRepository> = self.store.clone();
        let clicks: Arc<dyn ClickRepository> = match self.clicks {
            Some(clicks) => clicks,
            None => self.store.clone(),
        };

        let cancel = CancellationToken::new();
        let consumer = ClickConsumer::new(
            Arc::new(channel.subscribe()),
            clicks,
            ConsumerSettings {
                max_deliveries: self.max_deliveries,
                drain_grace: Duration::from_secs(1),
                retry_backoff: Duration::from_millis(5),
            },
        )
        .spawn(cancel.clone());

        let link_service = LinkService::new(
            links.clone(),
            self.cache.clone(),
            Arc::new(RandomCodeGenerator::default()),
            LinkSettings {
                base_url: "http://sho.rt".to_string(),
                max_attempts: 5,
                cache_ttl: self.cache_ttl,
            },
        );
        let resolver = Resolver::new(
            links.clone(),
            self.cache.clone(),
            ClickPublisher::new(Arc::new(channel.clone()), 1024),
            self.cache_ttl,
        );

        let state = AppState {
            link_service: Arc::new(link_service),
            resolver: Arc::new(resolver),
            links,
            cache: self.cache.clone(),
            consumer_state: consumer.watch(),
            behind_proxy: self.behind_proxy,
        };

        let app = shortlink_relay::api::routes::public_routes()
            .with_state(state)
            .layer(MockConnectInfoLayer(PEER_ADDR.parse().unwrap()));

        TestApp {
            server: TestServer::new(app).unwrap(),
            store: self.store,
            cache: self.cache,
            channel,
            cancel,
            consumer,
        }
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<InMemoryLinkStore>,
    pub cache: Arc<dyn CacheService>,
    pub channel: MemoryChannel,
    cancel: CancellationToken,
    consumer: ConsumerHandle,
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            cache: Arc::new(MemoryCache::default()),
            clicks: None,
            store: Arc::new(InMemoryLinkStore::new()),
            cache_ttl: Duration::from_secs(60),
            max_deliveries: 3,
            behind_proxy: false,
        }
    }

    pub fn spawn() -> TestApp {
        Self::builder().build()
    }

    /// Inserts a link straight into the store, bypassing the cache.
    pub async fn seed_link(&self, code: &str, url: &str) -> ShortLink {
        self.store.create(NewLink::new(url, code)).await.unwrap()
    }

    pub async fn clicks_of(&self, code: &str) -> i64 {
        self.store.find_by_code(code).await.unwrap().unwrap().clicks
    }

    /// Waits until `code` has `expected` clicks applied and the channel is drained.
    pub async fn wait_for_clicks(&self, code: &str, expected: i64) {
        for _ in 0..500 {
            if self.clicks_of(code).await == expected && self.channel.pending() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {expected} clicks for {code}, got {} ({} pending)",
            self.clicks_of(code).await,
            self.channel.pending()
        );
    }

    pub fn consumer_state(&self) -> ConsumerState {
        self.consumer.state()
    }

    /// Cancels the consumer, waits for it, and returns its final state.
    pub async fn shutdown(self) -> ConsumerState {
        let state = self.consumer.watch();
        self.cancel.cancel();
        self.consumer.join().await;
        let final_state = *state.borrow();
        final_state
    }
}
