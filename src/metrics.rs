use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe the relay's
    /// series. Call once per process, before anything records.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_metrics();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// HELP text for every series. Descriptions sent before a recorder is
/// installed are dropped, so this runs from [`Metrics::init`].
fn describe_metrics() {
    describe_counter!("notam_polls_total", "Poll cycles run to completion.");
    describe_counter!(
        "notam_polls_skipped_total",
        "Poll triggers dropped because a cycle was already running."
    );
    describe_counter!("notam_fetch_errors_total", "Source fetches that failed.");
    describe_counter!("notam_delivered_total", "Notices accepted by the transport.");
    describe_counter!(
        "notam_delivery_failures_total",
        "Notices the transport failed to deliver (retried next cycle)."
    );
    describe_counter!(
        "notam_unstable_ids_total",
        "New notices without a stable id (always re-detected as new)."
    );
    describe_counter!("notam_fetched_total", "Notices parsed from a provider response.");
    describe_counter!(
        "notam_provider_errors_total",
        "Provider fetches that failed after all retries."
    );
    describe_gauge!("notam_seen_ids", "Ids currently held in the seen-set.");
    describe_gauge!("notam_last_poll_ts", "Unix ts when the last cycle finished.");
}
