use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use session_core::infrastructure::driving::{cli, Cli};
use session_core::{CoreConfig, SessionCore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("session_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    let config = CoreConfig::load().context("failed to load configuration")?;
    let core = SessionCore::build(config)?;
    cli::run(&core, args.command).await
}
