use crate::app::status::render_status;
use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::gateway;
use crate::prompt::TemplateCategory;
use crate::usage::{ClientId, RateLimiter, SqliteUsageLedger};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::info;

async fn open_ledger(config: &Config) -> Result<Arc<SqliteUsageLedger>> {
    let path = config.ledger_path();
    let ledger = SqliteUsageLedger::open(&path)
        .await
        .with_context(|| format!("open usage ledger at {}", path.display()))?;
    Ok(Arc::new(ledger))
}

async fn show_usage(config: &Config, client: &str) -> Result<()> {
    let ledger = open_ledger(config).await?;
    let limiter = RateLimiter::new(ledger.clone());
    let client = ClientId::new(client.trim());

    let usage = limiter.usage(&client, Utc::now()).await?;
    println!("Client      {client}");
    println!("Used        {} / {}", usage.used, usage.limit);
    println!("Remaining   {}", usage.remaining);
    if let Some(at) = usage.next_release_at {
        println!("Next slot   {}", at.to_rfc3339());
    }

    ledger.close().await;
    Ok(())
}

async fn prune(config: &Config, older_than_hours: u32) -> Result<()> {
    let ledger = open_ledger(config).await?;
    let cutoff = Utc::now() - chrono::Duration::hours(i64::from(older_than_hours));

    let removed = ledger.prune_before(cutoff).await?;
    info!(removed, cutoff = %cutoff, "pruned usage ledger");
    println!("Removed {removed} usage record(s) older than {older_than_hours}h");

    ledger.close().await;
    Ok(())
}

fn list_templates() {
    let default = TemplateCategory::default();
    for category in TemplateCategory::iter() {
        if category == default {
            println!("{category} (default)");
        } else {
            println!("{category}");
        }
    }
}

pub async fn dispatch(cli: Cli, config: Arc<Config>) -> Result<()> {
    match cli.command {
        Commands::Serve { port, host } => {
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            info!(host = %host, port, model = %config.generator.model, "starting gateway");
            gateway::run_gateway(&host, port, config).await
        }
        Commands::Usage { client } => show_usage(&config, &client).await,
        Commands::Prune { older_than_hours } => prune(&config, older_than_hours).await,
        Commands::Templates => {
            list_templates();
            Ok(())
        }
        Commands::Status => {
            println!("{}", render_status(&config));
            Ok(())
        }
    }
}
