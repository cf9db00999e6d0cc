//! Metrics definitions for the edge gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `edge_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: 7 values max
//! - `endpoint`: one per route, everything else is `/other`
//! - `status` / `result` / `outcome`: fixed sets defined by the callers
//! - `backend`: one per session bridge

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Histogram buckets shared by the edge metrics.
const HTTP_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000,
];
const KEY_FETCH_BUCKETS: &[f64] = &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000];

/// Build a Prometheus recorder with the edge histogram buckets.
///
/// # Errors
///
/// Returns an error if a bucket configuration is rejected.
pub fn metrics_builder() -> Result<PrometheusBuilder, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("edge_http_request".to_string()),
            HTTP_BUCKETS,
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Key fetches are bounded by the fetch timeout (max 60s)
        .set_buckets_for_metric(
            Matcher::Prefix("edge_key_fetch".to_string()),
            KEY_FETCH_BUCKETS,
        )
        .map_err(|e| format!("Failed to set key fetch buckets: {e}"))
}

/// Install the global Prometheus recorder and return its handle.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    metrics_builder()?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `edge_http_requests_total`, `edge_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("edge_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("edge_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        408 | 504 => "timeout",
        401 | 403 => "denied",
        _ => "error",
    }
}

/// Map a request path onto a known route.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/ping" => "/ping",
        "/metrics" => "/metrics",
        "/api/v1/me" => "/api/v1/me",
        "/auth-sign-in" => "/auth-sign-in",
        "/auth-sign-out" => "/auth-sign-out",
        "/login" => "/login",
        "/websockify" => "/websockify",
        _ => "/other",
    }
}

// ============================================================================
// Key Resolver Metrics
// ============================================================================

/// Record a key fetch.
///
/// Metric: `edge_key_fetch_total`, `edge_key_fetch_duration_seconds`
/// Labels: `status` ("success" or an `AuthFailure` label)
pub fn record_key_fetch(status: &'static str, duration: Duration) {
    histogram!("edge_key_fetch_duration_seconds").record(duration.as_secs_f64());
    counter!("edge_key_fetch_total", "status" => status).increment(1);
}

/// Record a key slot lookup.
///
/// Metric: `edge_key_cache_total`
/// Labels: `result` ("hit", "miss")
pub fn record_key_cache(result: &'static str) {
    counter!("edge_key_cache_total", "result" => result).increment(1);
}

// ============================================================================
// Verification Metrics
// ============================================================================

/// Record a verification memo lookup.
///
/// Metric: `edge_verification_cache_total`
/// Labels: `result` ("hit", "miss")
pub fn record_verification_cache(result: &'static str) {
    counter!("edge_verification_cache_total", "result" => result).increment(1);
}

/// Record an identity binding check.
///
/// Metric: `edge_identity_binding_total`
/// Labels: `result` ("bound", "match", "mismatch", "error")
pub fn record_identity_binding(result: &'static str) {
    counter!("edge_identity_binding_total", "result" => result).increment(1);
}

/// Record the outcome a session bridge produced.
///
/// Metric: `edge_auth_outcomes_total`
/// Labels: `backend`, `outcome` ("authenticated" or an `AuthFailure` label)
pub fn record_auth_outcome(backend: &'static str, outcome: &'static str) {
    counter!("edge_auth_outcomes_total",
        "backend" => backend,
        "outcome" => outcome
    )
    .increment(1);
}
