//! Peaker - periodic IMAP new-mail notifier

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use peaker_core::config;
use peaker_core::{ImapReader, Scheduler, SmtpOutbox, Stop, Watcher};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Load the config at `path` and build the scheduler and watcher from it.
async fn prepare(path: &Path) -> anyhow::Result<(Scheduler, Watcher<ImapReader, SmtpOutbox>)> {
    let config = config::load_from(path)
        .await
        .context("loading configuration")?;
    let config = Arc::new(config);

    tracing::info!(
        "Watching {} accounts every {:?}",
        config.accounts.len(),
        config.interval
    );

    let outbox = SmtpOutbox::new(config.outbound.clone());
    let watcher = Watcher::new(Arc::clone(&config), ImapReader::new(), outbox)?;

    Ok((Scheduler::from_config(&config), watcher))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("peaker=info".parse()?))
        .init();

    tracing::info!("Starting Peaker");

    let (scheduler, mut watcher) = prepare(&config::config_path()).await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Can't listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match scheduler.run(&mut watcher, shutdown).await {
        Stop::Shutdown => tracing::info!("Shutting down"),
        Stop::Requested => {
            anyhow::bail!("stopped because the outbound server rejects notifications")
        }
    }

    Ok(())
}
