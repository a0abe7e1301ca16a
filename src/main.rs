//! spotify-web-core CLI
//!
//! Fetch resources from the Web API with a stored or client-credentials token

use clap::Parser;
use spotify_web_core::cli::{Cli, Runner};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays pure JSON lines
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    Runner::new(cli).run().await?;
    Ok(())
}
