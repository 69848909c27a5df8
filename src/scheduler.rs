// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::poller::{PollOutcome, Poller};

/// Spawn the poll timer. The first tick fires immediately. Cancelling
/// `shutdown` stops further ticks; a cycle that is already running is
/// left to finish.
pub fn spawn_poll_scheduler(
    poller: Arc<Poller>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("poll scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let PollOutcome::Completed(report) = poller.poll().await {
                        tracing::debug!(
                            target: "scheduler",
                            delivered = report.delivered,
                            failed = report.failed,
                            "scheduled poll done"
                        );
                    }
                }
            }
        }
    })
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT received, stopping poll timer"),
        _ = terminate => tracing::info!("SIGTERM received, stopping poll timer"),
    }
}
