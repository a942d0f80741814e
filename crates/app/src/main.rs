//! `kibitzer` command-line host.
//!
//! Loads settings from the platform config directory, a conversation from a
//! JSON file, optional connection profiles and preset sources, then drives the
//! commentary pipeline and prints what the kibitzer says.

mod cli;
mod commands;
mod profiles;
mod store;
mod transcript;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    commands::run(cli).await
}
