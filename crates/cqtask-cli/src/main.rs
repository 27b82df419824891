use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;

use cli::Cli;
use cqtask_worker::WorkerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "cqtask=debug,cqtask_core=debug,cqtask_worker=debug".into()),
    );
    if cli.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let mut config = WorkerConfig::load_from(Some(cli.config.as_str()))?;
    if let Some(capacity) = cli.queue_capacity {
        config.queue_capacity = capacity;
        config.validate()?;
    }

    commands::execute(cli.command, config).await
}
