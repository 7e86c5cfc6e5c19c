//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connection status and block height
//! - Swap registration and verification outcomes
//! - Payout submission and confirmation
//! - MPC sign and accept requests
//! - Health checks and error rates

use crate::error::{RouterError, RouterResult};
use crate::state::SwapStatus;

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{error, info};

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "router_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).unwrap();

    pub static ref CHAIN_BLOCK_HEIGHT: GaugeVec = register_gauge_vec!(
        "router_chain_block_height",
        "Current block height per chain",
        &["chain_id"]
    ).unwrap();

    // Swap metrics
    pub static ref SWAPS_REGISTERED: CounterVec = register_counter_vec!(
        "router_swaps_registered_total",
        "Swaps registered by source chain and initial status",
        &["chain_id", "status"]
    ).unwrap();

    pub static ref SWAPS_VERIFIED: CounterVec = register_counter_vec!(
        "router_swaps_verified_total",
        "Swaps that passed verification by source chain and status",
        &["chain_id", "status"]
    ).unwrap();

    pub static ref SWAPS_FAILED: CounterVec = register_counter_vec!(
        "router_swaps_failed_total",
        "Swaps rejected by verification by source chain and status",
        &["chain_id", "status"]
    ).unwrap();

    // Payout metrics
    pub static ref PAYOUTS_SENT: CounterVec = register_counter_vec!(
        "router_payouts_sent_total",
        "Payout transactions broadcast",
        &["chain_id"]
    ).unwrap();

    pub static ref PAYOUTS_STABLE: CounterVec = register_counter_vec!(
        "router_payouts_stable_total",
        "Payout transactions confirmed",
        &["chain_id"]
    ).unwrap();

    pub static ref PAYOUTS_FAILED: CounterVec = register_counter_vec!(
        "router_payouts_failed_total",
        "Payout transactions failed or lost",
        &["chain_id"]
    ).unwrap();

    // MPC metrics
    pub static ref MPC_SIGN_REQUESTS: CounterVec = register_counter_vec!(
        "router_mpc_sign_requests_total",
        "MPC sign requests by result",
        &["result"]
    ).unwrap();

    pub static ref MPC_SIGN_LATENCY: HistogramVec = register_histogram_vec!(
        "router_mpc_sign_latency_seconds",
        "Time from sign request to complete threshold signature",
        &[],
        vec![5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0, 700.0]
    ).unwrap();

    pub static ref MPC_ACCEPTS: CounterVec = register_counter_vec!(
        "router_mpc_accepts_total",
        "Answers given to pending sign requests",
        &["decision"]
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECK_SUCCESS: CounterVec = register_counter_vec!(
        "router_health_check_success_total",
        "Total successful health checks",
        &["component"]
    ).unwrap();

    pub static ref HEALTH_CHECK_FAILURE: CounterVec = register_counter_vec!(
        "router_health_check_failure_total",
        "Total failed health checks",
        &["component"]
    ).unwrap();

    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "router_errors_total",
        "Errors worth alerting on, by component and kind",
        &["component", "kind"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> RouterResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RouterError::Internal(format!("bind metrics server {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| RouterError::Internal(format!("metrics server: {}", e)))
    }
}

async fn metrics_handler() -> String {
    render()
}

/// Current metrics in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_block_height(chain_id: u64, block_number: u64) {
    CHAIN_BLOCK_HEIGHT
        .with_label_values(&[&chain_id.to_string()])
        .set(block_number as f64);
}

pub fn record_swap_registered(chain_id: u64, status: SwapStatus) {
    SWAPS_REGISTERED
        .with_label_values(&[&chain_id.to_string(), status.as_str()])
        .inc();
}

pub fn record_swap_verified(chain_id: u64, status: SwapStatus) {
    SWAPS_VERIFIED
        .with_label_values(&[&chain_id.to_string(), status.as_str()])
        .inc();
}

pub fn record_swap_failed(chain_id: u64, status: SwapStatus) {
    SWAPS_FAILED
        .with_label_values(&[&chain_id.to_string(), status.as_str()])
        .inc();
}

pub fn record_payout_sent(chain_id: u64) {
    PAYOUTS_SENT
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_payout_stable(chain_id: u64) {
    PAYOUTS_STABLE
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_payout_failed(chain_id: u64) {
    PAYOUTS_FAILED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_mpc_sign(success: bool, elapsed: Duration) {
    let result = if success { "success" } else { "failure" };
    MPC_SIGN_REQUESTS.with_label_values(&[result]).inc();
    if success {
        MPC_SIGN_LATENCY
            .with_label_values(&[])
            .observe(elapsed.as_secs_f64());
    }
}

pub fn record_mpc_accept(decision: &str) {
    MPC_ACCEPTS.with_label_values(&[decision]).inc();
}

pub fn record_health_check(component: &str, healthy: bool) {
    if healthy {
        HEALTH_CHECK_SUCCESS.with_label_values(&[component]).inc();
    } else {
        HEALTH_CHECK_FAILURE.with_label_values(&[component]).inc();
    }
}

pub fn record_error(component: &str, error: &RouterError) {
    if error.should_alert() {
        ERRORS
            .with_label_values(&[component, error.kind().as_str()])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_counters_are_labelled_by_status() {
        let before = SWAPS_REGISTERED
            .with_label_values(&["4242", "NotStable"])
            .get();
        record_swap_registered(4242, SwapStatus::NotStable);
        let after = SWAPS_REGISTERED
            .with_label_values(&["4242", "NotStable"])
            .get();
        assert_eq!(after - before, 1.0);
    }

    #[test]
    fn test_render_contains_metric_names() {
        record_payout_sent(4243);
        assert!(render().contains("router_payouts_sent_total"));
    }
}
