// src/metrics.rs
use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::source::{FetchStatus, SourceId};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("aggregate_runs_total", "Aggregation runs started.");
        describe_counter!(
            "aggregate_source_results_total",
            "Terminal adapter results by source and status."
        );
        describe_counter!("aggregate_retries_total", "Adapter retries by source.");
        describe_counter!(
            "aggregate_no_data_total",
            "Runs that ended without any usable source result."
        );
        describe_counter!(
            "aggregate_fallback_invocations_total",
            "Runs that invoked the lightweight fallback source."
        );
        describe_counter!(
            "aggregate_normalization_anomalies_total",
            "Raw values that could not be coerced to the canonical schema."
        );
        describe_histogram!("aggregate_fetch_ms", "Adapter attempt latency in milliseconds.");
        describe_gauge!(
            "aggregate_last_overall_confidence",
            "Overall confidence of the most recent profile."
        );
    });
}

pub(crate) fn record_run() {
    counter!("aggregate_runs_total").increment(1);
}

pub(crate) fn record_source_result(source: SourceId, status: FetchStatus) {
    counter!(
        "aggregate_source_results_total",
        "source" => source.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
}

pub(crate) fn record_retry(source: SourceId) {
    counter!("aggregate_retries_total", "source" => source.as_str()).increment(1);
}

pub(crate) fn record_fetch_ms(source: SourceId, ms: f64) {
    histogram!("aggregate_fetch_ms", "source" => source.as_str()).record(ms);
}

pub(crate) fn record_fallback() {
    counter!("aggregate_fallback_invocations_total").increment(1);
}

pub(crate) fn record_no_data() {
    counter!("aggregate_no_data_total").increment(1);
}

pub(crate) fn record_anomalies(source: SourceId, n: usize) {
    if n > 0 {
        counter!("aggregate_normalization_anomalies_total", "source" => source.as_str())
            .increment(n as u64);
    }
}

pub(crate) fn record_overall_confidence(c: f64) {
    gauge!("aggregate_last_overall_confidence").set(c);
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Call once, from the binary.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
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
