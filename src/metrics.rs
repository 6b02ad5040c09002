// src/metrics.rs
//! Prometheus recorder and metric descriptions.

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("curator_runs_total", "Curation runs by outcome.");
        describe_counter!("curator_items_fetched_total", "Items collected from feeds after in-run dedup.");
        describe_counter!("curator_feed_errors_total", "Feed fetch/parse failures.");
        describe_counter!(
            "curator_dedup_skipped_total",
            "Items skipped because a live notified/rejected record exists."
        );
        describe_counter!("curator_store_errors_total", "Retention store read failures.");
        describe_counter!("curator_scored_total", "Items with a validated relevance assessment.");
        describe_counter!("curator_rejected_total", "Rejected items by reason.");
        describe_counter!("curator_delivery_attempts_total", "Webhook POSTs issued.");
        describe_counter!("curator_delivered_items_total", "Items delivered in a message.");
        describe_histogram!("curator_run_duration_ms", "Wall time of one run in milliseconds.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
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
