//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Submission outcomes by error kind
//! - Signing and relay latency
//! - In-flight submissions

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref SUBMISSIONS: CounterVec = register_counter_vec!(
        "gas_snooze_submissions_total",
        "Submission attempts by outcome",
        &["outcome"]
    ).expect("register gas_snooze_submissions_total");

    pub static ref TOKEN_LOOKUP_FAILURES: CounterVec = register_counter_vec!(
        "gas_snooze_token_lookup_failures_total",
        "Token directory failures (degraded to defaults)",
        &["chain_id"]
    ).expect("register gas_snooze_token_lookup_failures_total");

    pub static ref STEP_LATENCY: HistogramVec = register_histogram_vec!(
        "gas_snooze_step_latency_seconds",
        "Latency of pipeline steps that leave the process",
        &["step"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0]
    ).expect("register gas_snooze_step_latency_seconds");

    pub static ref IN_FLIGHT: Gauge = register_gauge!(
        "gas_snooze_submissions_in_flight",
        "Submissions currently between validation and relay response"
    ).expect("register gas_snooze_submissions_in_flight");
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> std::io::Result<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_submission(outcome: &str) {
    SUBMISSIONS.with_label_values(&[outcome]).inc();
}

pub fn record_token_lookup_failure(chain_id: u64) {
    TOKEN_LOOKUP_FAILURES
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_step_latency(step: &str, latency_secs: f64) {
    STEP_LATENCY.with_label_values(&[step]).observe(latency_secs);
}

/// Counts a submission as in flight until dropped
pub struct InFlight(());

impl InFlight {
    pub fn start() -> Self {
        IN_FLIGHT.inc();
        Self(())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        IN_FLIGHT.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handler_exports_registered_metrics() {
        record_submission("accepted");
        let _in_flight = InFlight::start();
        record_step_latency("relay", 0.2);

        let body = metrics_handler().await.unwrap();
        assert!(body.contains("gas_snooze_submissions_total"));
        assert!(body.contains("gas_snooze_step_latency_seconds"));
        assert!(body.contains("gas_snooze_submissions_in_flight"));
    }
}
