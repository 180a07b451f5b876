use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use wanderer_core::broker::Broker;
use wanderer_core::clock::SystemClock;
use wanderer_core::config::AppConfig;
use wanderer_core::enricher::EnrichmentSettings;
use wanderer_core::error::CoreError;
use wanderer_core::event_store::EventStore;
use wanderer_core::metrics::Metrics;
use wanderer_core::models::{ReferenceKind, ReferenceRecord};
use wanderer_core::pipeline::IngestionPipeline;
use wanderer_core::rate_limiter::RateLimiter;
use wanderer_core::reference_cache::{EsiClient, ReferenceCache};
use wanderer_core::subscription_index::SubscriptionIndex;

use wanderer_server::app_state::AppState;
use wanderer_server::subscriptions::SubscriptionRegistry;
use wanderer_server::websocket::ConnectionManager;

/// Never hits the network; every lookup resolves to "unknown". Good enough
/// for routing/handler tests that don't assert on enriched attacker names.
struct NullEsiClient;

#[async_trait]
impl EsiClient for NullEsiClient {
    async fn fetch(&self, _kind: ReferenceKind, _id: i64) -> Result<Option<ReferenceRecord>, CoreError> {
        Ok(None)
    }
}

pub fn test_state() -> AppState {
    let config = Arc::new(AppConfig::default());
    let metrics = Arc::new(Metrics::new());

    let broker = Broker::new();
    let event_store = Arc::new(EventStore::new(broker, config.store.max_events_per_system));

    let system_index = Arc::new(SubscriptionIndex::new());
    let character_index = Arc::new(SubscriptionIndex::new());
    let subscriptions = Arc::new(SubscriptionRegistry::new(system_index.clone(), character_index.clone()));
    let connections = Arc::new(ConnectionManager::new());

    let rate_limiter = Arc::new(RateLimiter::new(100, 100, 100, 100));
    let reference_cache = Arc::new(ReferenceCache::new(
        Arc::new(NullEsiClient),
        Duration::from_secs(3600),
        Duration::from_secs(3600),
        Duration::from_secs(60),
    ));

    let pipeline = Arc::new(IngestionPipeline::new(
        reference_cache.clone(),
        event_store.clone(),
        EnrichmentSettings {
            min_attackers_for_parallel: 3,
            max_concurrency: 10,
            task_timeout: Duration::from_secs(30),
        },
        metrics.clone(),
        Arc::new(SystemClock),
        config.redisq.cutoff_window,
    ));

    AppState {
        config,
        pipeline,
        event_store,
        system_index,
        character_index,
        subscriptions,
        connections,
        reference_cache,
        rate_limiter,
        metrics,
    }
}
