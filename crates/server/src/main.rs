//! Marketplace server binary.
//!
//! Serves the order, product and shop API on port 8080 by default.
//!
//! # Architecture
//!
//! - Axum JSON API over a generic store (`PostgreSQL` or in-memory)
//! - Product reads through a `moka` cache, or Redis with the `redis` feature
//! - Cache writes applied by a background worker, flushed on shutdown
//!
//! Migrations are not run on startup. Run them explicitly via
//! `cargo run -p marketplace-cli -- migrate`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::error::Error;
use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use marketplace_server::cache::{CacheLayer, CacheWriter, InProcessCache, ProductCache};
use marketplace_server::config::{CacheConfig, LogFormat, ServerConfig, StoreKind};
use marketplace_server::db::{self, MemoryStore, PgStore, Store};
use marketplace_server::routes;
use marketplace_server::state::AppState;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "marketplace_server=info,tower_http=debug".into());

    let fmt_layer = match format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

/// Pick the product cache backend.
#[cfg_attr(not(feature = "redis"), allow(clippy::unused_async))]
async fn build_cache(config: &CacheConfig) -> Result<Arc<dyn ProductCache>, Box<dyn Error>> {
    #[cfg(feature = "redis")]
    if let Some(url) = &config.redis_url {
        use secrecy::ExposeSecret;

        let cache = marketplace_server::cache::RedisCache::connect(url.expose_secret()).await?;
        tracing::info!("Using Redis product cache");
        return Ok(Arc::new(cache));
    }

    #[cfg(not(feature = "redis"))]
    if config.redis_url.is_some() {
        tracing::warn!("MARKETPLACE_REDIS_URL is set but the `redis` feature is disabled");
    }

    tracing::info!(capacity = config.capacity, "Using in-process product cache");
    Ok(Arc::new(InProcessCache::new(config.capacity)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load configuration from environment (needed for Sentry init)
    let config = ServerConfig::from_env()?;

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);
    init_tracing(config.log_format);

    let backend = build_cache(&config.cache).await?;
    let (writer, writer_task) = CacheWriter::spawn(
        Arc::clone(&backend),
        config.cache.ttl,
        config.cache.queue_depth,
    );
    let cache = CacheLayer::new(backend, writer);

    match config.store {
        StoreKind::Postgres => {
            let url = config
                .database
                .url
                .as_ref()
                .ok_or("MARKETPLACE_DATABASE_URL is required for the postgres store")?;
            let pool = db::create_pool(url, &config.database).await?;
            tracing::info!("Database pool created");
            serve(PgStore::new(pool), cache, &config).await?;
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store; data is lost on exit");
            serve(MemoryStore::new(), cache, &config).await?;
        }
    }

    // Every writer handle is gone once `serve` returns, so the worker drains
    // and exits.
    if let Err(e) = writer_task.await {
        tracing::error!(error = %e, "cache writer task failed");
    }
    Ok(())
}

async fn serve<S: Store>(
    store: S,
    cache: CacheLayer,
    config: &ServerConfig,
) -> Result<(), Box<dyn Error>> {
    let state = AppState::new(store, cache, &config.order);

    let app = routes::app(state.clone())
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("marketplace listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.cache_writer().flush().await;
    tracing::info!("Cache writer flushed");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
