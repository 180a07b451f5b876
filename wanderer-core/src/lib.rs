//! Core ingestion, enrichment, event-store, and subscription-routing domain
//! for WandererKills. Everything in this crate is transport-agnostic: the
//! `wanderer-server` crate wires these pieces to RedisQ, HTTP, and
//! WebSockets.

pub mod broker;
pub mod clock;
pub mod config;
pub mod enricher;
pub mod error;
pub mod event_store;
pub mod http_fetcher;
pub mod matcher;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod poller;
pub mod rate_limiter;
pub mod reference_cache;
pub mod subscription_index;

pub use config::AppConfig;
pub use error::{CoreError, CoreResult};
