//! Prometheus metrics helpers for graphgate.
//!
//! Recording is a no-op until a recorder is installed, so library code and
//! tests can call these helpers unconditionally.
//!
//! # Usage
//!
//! ```rust,ignore
//! use graphgate_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9091, handle).await.unwrap();
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: pipeline area (`gateway_`, `decode_`, `render_`)
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: only low-cardinality values (outcome kind, stage name)

use std::net::SocketAddr;
use std::time::Duration;

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Requests answered, labelled by `outcome`.
pub const GATEWAY_REQUESTS: &str = "gateway_requests_total";
/// Decoding stages applied, labelled by `stage`.
pub const DECODE_STAGES: &str = "decode_stages_total";
/// Renderer processes spawned.
pub const RENDER_INVOCATIONS: &str = "render_invocations_total";
/// Renderer runs that failed to spawn or exited non-zero.
pub const RENDER_FAILURES: &str = "render_failures_total";
/// Renderer runs killed after exceeding the time budget.
pub const RENDER_TIMEOUTS: &str = "render_timeouts_total";
/// Requests turned away by the admission gate.
pub const RENDER_REJECTED: &str = "render_rejected_total";
/// Wall-clock duration of completed renderer runs.
pub const RENDER_DURATION: &str = "render_duration_seconds";
/// Renderer processes currently running.
pub const RENDER_INFLIGHT: &str = "render_inflight";

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if a recorder is already installed.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_gateway_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_gateway_metrics();
    Some(handle)
}

/// Serve `/metrics` on `port` from a background task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });

    Ok(())
}

fn register_gateway_metrics() {
    describe_counter!(
        GATEWAY_REQUESTS,
        "Requests answered by the gateway (label: outcome)"
    );
    describe_counter!(
        DECODE_STAGES,
        "Payload decoding stages applied (label: stage)"
    );
    describe_counter!(RENDER_INVOCATIONS, "Renderer processes spawned");
    describe_counter!(
        RENDER_FAILURES,
        "Renderer runs that failed to spawn or exited non-zero"
    );
    describe_counter!(
        RENDER_TIMEOUTS,
        "Renderer runs killed after exceeding the time budget"
    );
    describe_counter!(
        RENDER_REJECTED,
        "Requests rejected because every render slot was busy"
    );
    describe_histogram!(
        RENDER_DURATION,
        "Wall-clock duration of completed renderer runs"
    );
    describe_gauge!(RENDER_INFLIGHT, "Renderer processes currently running");
}

/// Count an answered request under its outcome label.
pub fn record_outcome(outcome: &'static str) {
    metrics::counter!(GATEWAY_REQUESTS, "outcome" => outcome).increment(1);
}

/// Count an applied decoding stage.
pub fn record_stage(stage: &'static str) {
    metrics::counter!(DECODE_STAGES, "stage" => stage).increment(1);
}

#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}

#[inline]
pub fn record_duration(name: &'static str, elapsed: Duration) {
    metrics::histogram!(name).record(elapsed.as_secs_f64());
}
