//! # Wanderer Kills Server
//!
//! Real-time EVE Online killmail ingestion, enrichment, and fan-out.
//!
//! ## Architecture
//!
//! - A single RedisQ long-poll loop feeds raw killmail packages into an
//!   [`wanderer_core::pipeline::IngestionPipeline`].
//! - Enriched killmails land in an in-memory [`wanderer_core::event_store::EventStore`],
//!   which both answers HTTP polling reads and fans new kills out over a
//!   broadcast [`wanderer_core::broker::Broker`].
//! - WebSocket sessions and HTTP subscription CRUD sit on top of that broker
//!   and the two [`wanderer_core::subscription_index::SubscriptionIndex`]
//!   instances (system and character).

pub mod app_state;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod subscriptions;
pub mod validation;
pub mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use wanderer_core::broker::Broker;
use wanderer_core::clock::SystemClock;
use wanderer_core::enricher::EnrichmentSettings;
use wanderer_core::event_store::EventStore;
use wanderer_core::http_fetcher::HttpFetcher;
use wanderer_core::metrics::Metrics;
use wanderer_core::pipeline::IngestionPipeline;
use wanderer_core::poller::{self, BackoffState, HttpRedisQClient, PollOutcome, RedisQClient, RedisQPackage};
use wanderer_core::rate_limiter::RateLimiter;
use wanderer_core::reference_cache::{HttpEsiClient, ReferenceCache};
use wanderer_core::subscription_index::SubscriptionIndex;

use app_state::AppState;
use config::{Args, ConfigLoader};
use subscriptions::SubscriptionRegistry;
use websocket::ConnectionManager;

/// Builds every long-lived component and binds the HTTP/WebSocket listener.
/// Runs until a shutdown signal is received, then drains the background
/// tasks it spawned before returning.
pub async fn run(args: Args) -> anyhow::Result<()> {
    let loaded = ConfigLoader::new().load(&args)?;
    let config = Arc::new(loaded.config);

    for warning in &loaded.warnings.items {
        warn!(%warning, "configuration warning");
    }
    info!(port = config.server.port, redisq_url = %config.redisq.url, "configuration loaded");

    let clock: Arc<dyn wanderer_core::clock::Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(Metrics::new());

    let broker = Broker::new();
    let event_store = Arc::new(EventStore::new(broker, config.store.max_events_per_system));

    let system_index = Arc::new(SubscriptionIndex::new());
    let character_index = Arc::new(SubscriptionIndex::new());
    let subscriptions = Arc::new(SubscriptionRegistry::new(system_index.clone(), character_index.clone()));
    let connections = Arc::new(ConnectionManager::new());

    let rate_limiter = Arc::new(RateLimiter::new(
        config.esi.rate_capacity,
        config.esi.rate_refill_per_sec,
        config.zkb.rate_capacity,
        config.zkb.rate_refill_per_sec,
    ));
    let esi_fetcher = HttpFetcher::new(config.esi.user_agent.clone());
    let esi_client = Arc::new(HttpEsiClient::new(esi_fetcher, rate_limiter.clone(), config.esi.clone()));
    let reference_cache = Arc::new(ReferenceCache::new(
        esi_client,
        config.cache.live_ttl,
        config.cache.ship_type_ttl,
        config.cache.negative_ttl,
    ));

    let enrichment_settings = EnrichmentSettings {
        min_attackers_for_parallel: config.enrichment.min_attackers_for_parallel,
        max_concurrency: config.enrichment.max_concurrency,
        task_timeout: config.enrichment.task_timeout,
    };

    let pipeline = Arc::new(IngestionPipeline::new(
        reference_cache.clone(),
        event_store.clone(),
        enrichment_settings,
        metrics.clone(),
        clock,
        config.redisq.cutoff_window,
    ));

    let state = AppState {
        config: config.clone(),
        pipeline: pipeline.clone(),
        event_store: event_store.clone(),
        system_index: system_index.clone(),
        character_index: character_index.clone(),
        subscriptions,
        connections,
        reference_cache,
        rate_limiter: rate_limiter.clone(),
        metrics,
    };

    let shutdown = tokio::sync::broadcast::channel::<()>(1).0;

    let poller_handle = {
        let fetcher = HttpFetcher::new(config.zkb.user_agent.clone());
        let client: Arc<dyn RedisQClient> = Arc::new(HttpRedisQClient::new(fetcher, rate_limiter, config.redisq.url.clone()));
        let redisq = config.redisq.clone();
        let pipeline = pipeline.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let queue_id = poller::new_queue_id();
            let mut backoff = BackoffState::new(redisq.initial_backoff, redisq.backoff_factor, redisq.max_backoff);
            loop {
                let outcome = tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    result = poller::poll_once(client.as_ref(), &queue_id) => result,
                };
                let poll_outcome = match outcome {
                    Ok(RedisQPackage::Empty) => PollOutcome::NoActivity,
                    Ok(RedisQPackage::Kill { killmail, zkb }) => {
                        match pipeline.ingest(&killmail, Some(&zkb)).await {
                            Some(wanderer_core::pipeline::IngestOutcome::Stored { .. }) => PollOutcome::KillReceived,
                            Some(wanderer_core::pipeline::IngestOutcome::Older) => PollOutcome::Older,
                            None => PollOutcome::Error,
                        }
                    }
                    Err(_) => PollOutcome::Error,
                };
                let delay = poller::next_delay(poll_outcome, &redisq, &mut backoff);
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            info!("redisq poller stopped");
        })
    };

    let gc_handle = {
        let event_store = event_store.clone();
        let interval = config.store.gc_interval;
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => event_store.garbage_collect(),
                }
            }
        })
    };

    let sweep_handle = {
        let system_index = system_index.clone();
        let character_index = character_index.clone();
        let interval = config.store.index_sweep_interval;
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        system_index.sweep_empty_buckets();
                        character_index.sweep_empty_buckets();
                    }
                }
            }
        })
    };

    let cors = match &config.origin_host {
        Some(host) => CorsLayer::permissive().allow_origin(host.parse::<axum::http::HeaderValue>()?),
        None => CorsLayer::permissive(),
    };

    let app = routes::create_api_router(state.clone())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(%addr, "starting wanderer-kills server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown.send(());
    for handle in [poller_handle, gc_handle, sweep_handle] {
        let _ = handle.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
