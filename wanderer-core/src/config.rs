//! The immutable configuration snapshot every component is handed at
//! construction time. The snapshot type lives in `wanderer-core` so both the
//! core components and the server's layered loader (defaults -> TOML file ->
//! env -> CLI, see `wanderer_server::config`) share one definition.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerSection,
    pub redisq: RedisQSection,
    pub esi: UpstreamSection,
    pub zkb: UpstreamSection,
    pub cache: CacheSection,
    pub enrichment: EnrichmentSection,
    pub store: StoreSection,
    pub secret_key_base: Option<String>,
    pub origin_host: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct RedisQSection {
    pub url: String,
    pub fast_interval: Duration,
    pub idle_interval: Duration,
    pub initial_backoff: Duration,
    pub backoff_factor: u32,
    pub max_backoff: Duration,
    pub cutoff_window: Duration,
}

#[derive(Debug, Clone)]
pub struct UpstreamSection {
    pub base_url: String,
    pub rate_capacity: u32,
    pub rate_refill_per_sec: u32,
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_base: Duration,
    pub retry_factor: u32,
    pub retry_max: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSection {
    pub live_ttl: Duration,
    pub ship_type_ttl: Duration,
    pub negative_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct EnrichmentSection {
    pub min_attackers_for_parallel: usize,
    pub max_concurrency: usize,
    pub task_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StoreSection {
    pub gc_interval: Duration,
    pub max_events_per_system: usize,
    pub recently_fetched_threshold: Duration,
    pub index_sweep_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSection {
                host: "0.0.0.0".to_string(),
                port: 4004,
            },
            redisq: RedisQSection {
                url: "https://zkillredisq.stream/listen.php".to_string(),
                fast_interval: Duration::from_secs(1),
                idle_interval: Duration::from_secs(5),
                initial_backoff: Duration::from_secs(1),
                backoff_factor: 2,
                max_backoff: Duration::from_secs(30),
                cutoff_window: Duration::from_secs(24 * 3600),
            },
            esi: UpstreamSection {
                base_url: "https://esi.evetech.net/latest".to_string(),
                rate_capacity: 100,
                rate_refill_per_sec: 100,
                user_agent: "wanderer-kills/0.1 (+https://example.invalid)".to_string(),
                max_retries: 3,
                retry_base: Duration::from_secs(1),
                retry_factor: 2,
                retry_max: Duration::from_secs(30),
            },
            zkb: UpstreamSection {
                base_url: "https://zkillboard.com/api".to_string(),
                rate_capacity: 100,
                rate_refill_per_sec: 50,
                user_agent: "wanderer-kills/0.1 (+https://example.invalid)".to_string(),
                max_retries: 3,
                retry_base: Duration::from_secs(1),
                retry_factor: 2,
                retry_max: Duration::from_secs(30),
            },
            cache: CacheSection {
                live_ttl: Duration::from_secs(3600),
                ship_type_ttl: Duration::from_secs(24 * 3600),
                negative_ttl: Duration::from_secs(60),
            },
            enrichment: EnrichmentSection {
                min_attackers_for_parallel: 3,
                max_concurrency: 10,
                task_timeout: Duration::from_secs(30),
            },
            store: StoreSection {
                gc_interval: Duration::from_secs(60),
                max_events_per_system: 10_000,
                recently_fetched_threshold: Duration::from_secs(5),
                index_sweep_interval: Duration::from_secs(5 * 60),
            },
            secret_key_base: None,
            origin_host: None,
        }
    }
}
