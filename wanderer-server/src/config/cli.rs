use std::path::PathBuf;

use clap::Parser;

/// Command line arguments for the killmail ingestion server. Every flag is
/// the final override layer on top of defaults, an optional TOML file, and
/// environment variables (§4.15).
#[derive(Parser, Debug, Default)]
#[command(name = "wanderer-server")]
#[command(about = "RedisQ ingestion, enrichment, and real-time killmail fan-out")]
pub struct Args {
    /// Path to a TOML config file (overrides WK_CONFIG).
    #[arg(long, env = "WK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server port (overrides config).
    #[arg(long, env = "WK_PORT")]
    pub port: Option<u16>,

    /// tracing-subscriber env-filter directive (overrides RUST_LOG).
    #[arg(long, env = "WK_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// RedisQ listen URL (overrides config).
    #[arg(long, env = "WK_REDISQ_URL")]
    pub redisq_url: Option<String>,
}
