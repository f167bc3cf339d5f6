use crate::notify::dispatch::Notifier;
use crate::notify::NotificationService;
use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

/// Run one escalation sweep and hand every event to `notifier`.
/// Returns how many events were delivered; delivery failures are logged, not fatal.
#[instrument(skip_all)]
pub async fn sweep_once(engine: &NotificationService, notifier: &dyn Notifier) -> Result<usize> {
    let events = engine.run_escalation_sweep().await?;
    let mut delivered = 0;
    for ev in &events {
        match notifier.dispatch(ev).await {
            Ok(()) => delivered += 1,
            Err(err) => warn!(
                ?err,
                transaction_id = %ev.transaction_id,
                tier = ev.tier.as_str(),
                "notification dispatch failed"
            ),
        }
    }
    if !events.is_empty() {
        info!(events = events.len(), delivered, "escalation notifications dispatched");
    }
    Ok(delivered)
}

/// Sweep every `interval` until `shutdown` resolves.
///
/// Sweeps run inline on one task, so they never overlap; a tick missed while
/// a slow sweep is running is skipped rather than queued. Each sweep is
/// bounded by `op_timeout`.
pub async fn run<F>(
    engine: &NotificationService,
    notifier: &dyn Notifier,
    interval: Duration,
    op_timeout: Duration,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    info!(interval_secs = interval.as_secs(), "escalation sweeper started");
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("escalation sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                match tokio::time::timeout(op_timeout, sweep_once(engine, notifier)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => error!(?err, "escalation sweep failed"),
                    Err(_) => error!(timeout_secs = op_timeout.as_secs(), "escalation sweep timed out"),
                }
            }
        }
    }
}
