use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use wanderer_server::config::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            args.log_level
                .clone()
                .map(tracing_subscriber::EnvFilter::new)
                .or_else(|| tracing_subscriber::EnvFilter::try_from_default_env().ok())
                .unwrap_or_else(|| tracing_subscriber::EnvFilter::new("wanderer_server=info,wanderer_core=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    wanderer_server::run(args).await
}
