//! The cloneable handle every handler extracts via `State<AppState>`. Each
//! field is an `Arc` so cloning the struct is cheap and shares the same
//! underlying components across every request/connection.

use std::fmt;
use std::sync::Arc;

use wanderer_core::config::AppConfig;
use wanderer_core::event_store::EventStore;
use wanderer_core::metrics::Metrics;
use wanderer_core::pipeline::IngestionPipeline;
use wanderer_core::rate_limiter::RateLimiter;
use wanderer_core::reference_cache::ReferenceCache;
use wanderer_core::subscription_index::SubscriptionIndex;

use crate::subscriptions::SubscriptionRegistry;
use crate::websocket::manager::ConnectionManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<IngestionPipeline>,
    pub event_store: Arc<EventStore>,
    pub system_index: Arc<SubscriptionIndex>,
    pub character_index: Arc<SubscriptionIndex>,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub connections: Arc<ConnectionManager>,
    pub reference_cache: Arc<ReferenceCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
