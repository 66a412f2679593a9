#![warn(clippy::all, clippy::pedantic)]

use anyhow::Result;
use clap::Parser;
use prompt_enhancer::app;
use prompt_enhancer::cli::Cli;
use prompt_enhancer::config::Config;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Install default crypto provider for Rustls TLS.
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::load_or_init()?;
    config.apply_env_overrides();
    config.validate()?;

    app::dispatch::dispatch(cli, Arc::new(config)).await
}
