// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("enrich_enqueued_total", "Locators accepted into the queue.");
        describe_counter!("enrich_requests_total", "Book page requests sent upstream.");
        describe_counter!("enrich_records_total", "Records merged into the result set.");
        describe_counter!(
            "enrich_not_found_total",
            "Ids with no title/rating upstream."
        );
        describe_counter!(
            "enrich_fetch_errors_total",
            "Network or HTTP failures while fetching."
        );
        describe_counter!(
            "enrich_deferred_total",
            "Fetches abandoned because of a pause during pacing."
        );
        describe_histogram!("enrich_fetch_ms", "Book page request time in milliseconds.");
        describe_histogram!("enrich_parse_ms", "Book page parse time in milliseconds.");
        describe_gauge!("enrich_pending", "Locators not yet dispatched.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    pub fn init() -> Result<Self> {
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

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding metrics listener on {addr}"))?;
        tracing::info!(target: "enrich", %addr, "serving /metrics");
        axum::serve(listener, self.router())
            .await
            .context("metrics server")
    }
}
