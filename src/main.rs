//! cursor-bridge - HTTP Server Entry Point
//!
//! Serves an OpenAI-compatible API backed by the `cursor-agent` CLI.

use cursor_bridge::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cursor_bridge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        "Loaded configuration: agent={} mode={} default_model={} strict_model={} workspace={}",
        config.agent_bin,
        config.mode,
        config.default_model,
        config.strict_model,
        config.workspace.display()
    );

    api::serve(config).await
}
