//! NOTAM relay binary entrypoint.
//! Loads configuration, starts the poll timer, and serves the control API.

use std::sync::Arc;

use notam_relay::api::{self, AppState};
use notam_relay::metrics::Metrics;
use notam_relay::scheduler::{shutdown_signal, spawn_poll_scheduler};
use notam_relay::{init_tracing, Config, Poller};
use shuttle_axum::ShuttleAxum;
use tokio_util::sync::CancellationToken;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    // Missing destination/credentials are fatal here.
    let cfg = Config::load()?;

    // Recorder first: anything recorded before it is installed is lost.
    let metrics = Metrics::init()?;
    let poller = Arc::new(Poller::from_config(&cfg).await?);

    let shutdown = CancellationToken::new();
    spawn_poll_scheduler(poller.clone(), cfg.poll_interval, shutdown.clone());
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    tracing::info!(
        airport = %cfg.airport_code,
        interval_ms = cfg.poll_interval.as_millis() as u64,
        probe = cfg.startup_probe,
        "notam relay started"
    );

    let router = api::router(AppState {
        poller,
        poll_interval: cfg.poll_interval,
    })
    .merge(metrics.router());

    Ok(router.into())
}
