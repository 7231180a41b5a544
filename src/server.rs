//! HTTP server initialization and runtime setup.
//!
//! Handles database connections, backend selection, the click consumer and
//! the Axum server lifecycle.

use crate::application::services::{ClickPublisher, LinkService, Resolver};
use crate::config::Config;
use crate::domain::click_worker::ClickConsumer;
use crate::domain::event_channel::{EventPublisher, EventSubscriber};
use crate::domain::repositories::{ClickRepository, LinkRepository};
use crate::infrastructure::cache::{CacheService, MemoryCache, NullCache, RedisCache};
use crate::infrastructure::channel::{MemoryChannel, RedisStreamPublisher, RedisStreamSubscriber};
use crate::infrastructure::persistence::{PgClickRepository, PgLinkRepository};
use crate::routes::app_router;
use crate::state::AppState;
use crate::utils::code_generator::RandomCodeGenerator;

use anyhow::{Context, Result};
use axum::ServiceExt;
use axum::extract::Request;
use redis::{Client, aio::ConnectionManager};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tokio_util::sync::CancellationToken;

/// Cache and click channel chosen at startup.
struct Backends {
    cache: Arc<dyn CacheService>,
    publisher: Arc<dyn EventPublisher>,
    subscriber: Arc<dyn EventSubscriber>,
}

/// Runs the HTTP server with the given configuration.
///
/// Initializes:
/// - PostgreSQL connection pool
/// - Apply migrations
/// - Redis cache and click streams (or in-process fallbacks)
/// - Background click consumer
/// - Axum HTTP server with graceful shutdown
///
/// # Errors
///
/// Returns an error if:
/// - Database connection or migration fails
/// - Server bind fails
/// - Server runtime error occurs
pub async fn run(config: Config) -> Result<()> {
    let pool = connect_database(&config).await?;
    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let pool = Arc::new(pool);
    let links: Arc<dyn LinkRepository> = Arc::new(PgLinkRepository::new(pool.clone()));
    let clicks: Arc<dyn ClickRepository> = Arc::new(PgClickRepository::new(pool));

    let backends = select_backends(&config).await;

    let cancel = CancellationToken::new();
    let consumer = ClickConsumer::new(backends.subscriber, clicks, config.consumer_settings())
        .spawn(cancel.clone());
    tracing::info!("Click consumer started");

    let publisher = ClickPublisher::new(backends.publisher, config.click_publish_max_inflight);
    let link_service = LinkService::new(
        links.clone(),
        backends.cache.clone(),
        Arc::new(RandomCodeGenerator::new(config.short_code_length)),
        config.link_settings(),
    );
    let resolver = Resolver::new(
        links.clone(),
        backends.cache.clone(),
        publisher,
        config.cache_ttl(),
    );

    let state = AppState {
        link_service: Arc::new(link_service),
        resolver: Arc::new(resolver),
        links,
        cache: backends.cache,
        consumer_state: consumer.watch(),
        behind_proxy: config.behind_proxy,
    };

    let app = app_router(state);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address '{}'", config.listen_addr))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(
        listener,
        ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("HTTP server stopped; draining click consumer");
    cancel.cancel();
    consumer.join().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn connect_database(config: &Config) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")
}

/// Connects to Redis, retrying with exponential backoff.
pub async fn connect_redis(redis_url: &str) -> Result<ConnectionManager> {
    let client = Client::open(redis_url).context("Invalid Redis URL")?;

    Retry::start(redis_backoff(), || {
        let client = client.clone();
        async move {
            ConnectionManager::new(client).await.inspect_err(|e| {
                tracing::warn!(error = %e, "Redis connection attempt failed");
            })
        }
    })
    .await
    .context("Failed to connect to Redis")
}

/// Delays between Redis connection attempts: five retries, jittered,
/// none longer than two seconds.
fn redis_backoff() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(100)
        .max_delay(Duration::from_secs(2))
        .map(jitter)
        .take(5)
}

async fn select_backends(config: &Config) -> Backends {
    let Some(redis_url) = &config.redis_url else {
        tracing::info!("Redis not configured; using in-process cache and click channel");
        return memory_backends(config, Arc::new(MemoryCache::default()));
    };

    match redis_backends(config, redis_url).await {
        Ok(backends) => {
            tracing::info!("Cache enabled (Redis); click events on Redis Streams");
            backends
        }
        Err(e) => {
            tracing::warn!(
                "Redis unavailable: {:#}. Cache disabled; click events kept in process",
                e
            );
            memory_backends(config, Arc::new(NullCache::new()))
        }
    }
}

async fn redis_backends(config: &Config, redis_url: &str) -> Result<Backends> {
    let manager = connect_redis(redis_url).await?;
    let stream_config = config.stream_config();

    let cache = RedisCache::from_manager(manager.clone()).await?;
    let subscriber = RedisStreamSubscriber::connect(redis_url, stream_config.clone()).await?;
    let publisher = RedisStreamPublisher::new(manager, stream_config);

    Ok(Backends {
        cache: Arc::new(cache),
        publisher: Arc::new(publisher),
        subscriber: Arc::new(subscriber),
    })
}

fn memory_backends(config: &Config, cache: Arc<dyn CacheService>) -> Backends {
    let channel = MemoryChannel::with_capacity(
        config.click_stream_prefix.clone(),
        config.click_stream_partitions,
        config.click_stream_max_len,
    );

    Backends {
        cache,
        subscriber: Arc::new(channel.subscribe()),
        publisher: Arc::new(channel),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_backoff_is_bounded() {
        let delays: Vec<Duration> = redis_backoff().collect();

        assert_eq!(delays.len(), 5);
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_connect_redis_rejects_invalid_url() {
        match connect_redis("not-a-redis-url").await {
            Ok(_) => panic!("an invalid URL must not connect"),
            Err(err) => assert!(err.to_string().contains("Invalid Redis URL")),
        }
    }
}
