use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use borrowdesk::clock::SystemClock;
use borrowdesk::config;
use borrowdesk::db;
use borrowdesk::db::lookup::SqlCatalog;
use borrowdesk::notify::dispatch::{LogNotifier, Notifier, WebhookNotifier};
use borrowdesk::notify::NotificationService;
use borrowdesk::sweeper;

#[derive(Debug, Parser)]
#[command(author, version, about = "Run the overdue escalation sweep on a timer")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let catalog = Arc::new(SqlCatalog::new(pool.clone()));
    let engine = NotificationService::new(pool, catalog.clone(), catalog, Arc::new(SystemClock));

    let notifier: Box<dyn Notifier> = match cfg.webhook_url() {
        Some(url) => {
            info!(%url, "dispatching notifications to webhook");
            Box::new(WebhookNotifier::new(url)?)
        }
        None => {
            warn!("no notify.webhook_url configured; notifications are only logged");
            Box::new(LogNotifier)
        }
    };

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    sweeper::run(
        &engine,
        &*notifier,
        Duration::from_secs(cfg.app.sweep_interval_secs),
        Duration::from_secs(cfg.app.op_timeout_secs),
        shutdown,
    )
    .await;

    Ok(())
}
