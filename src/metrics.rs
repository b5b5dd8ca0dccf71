// src/metrics.rs
use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Call once per process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe();
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

fn describe() {
    describe_counter!("collect_ticks_total", "Completed scheduler ticks");
    describe_counter!("collect_tick_failures_total", "Ticks aborted by the driver");
    describe_counter!("collect_sources_run_total", "Due sources run");
    describe_counter!("collect_source_failures_total", "Source runs that errored or panicked");
    describe_counter!("collect_items_stored_total", "Items appended to storage");
    describe_counter!("crawl_fetch_errors_total", "Failed page fetches inside strategies");
    describe_counter!("crawl_fallbacks_total", "Dispatches that fell back to the default strategy");
    describe_gauge!("collect_last_tick_ts", "Unix time of the last completed tick");
    describe_histogram!("crawl_dispatch_ms", "Dispatch latency in milliseconds");
}
