//! Metrics definitions for the voice chat service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `vc_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: 6 values (parameterized paths, everything else is `/other`)
//! - `status`: 3 values (success, error, timeout)
//! - `operation`: `create_meeting`, `create_participant`
//! - `outcome`: `joined`, `rejoined`, `full`, `invalid`, `conflict`, `error`
//! - `kind`: `mock`, `real`

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("vc_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Provider calls are bounded by the client timeout (max 30s)
        .set_buckets_for_metric(
            Matcher::Prefix("vc_provider_call".to_string()),
            &[
                0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000,
            ],
        )
        .map_err(|e| format!("Failed to set provider call buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `vc_http_requests_total`, `vc_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// This captures ALL HTTP responses including framework-level errors like
/// 415 Unsupported Media Type or 400 Bad Request from JSON rejection.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("vc_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("vc_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
///
/// Session IDs are client-chosen, so they are replaced with a placeholder.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/" | "/health" | "/metrics" | "/sessions" => path.to_string(),
        _ => {
            let parts: Vec<&str> = path.split('/').collect();
            // /sessions/{id}/join → ["", "sessions", "{id}", "join"]
            if parts.len() == 4
                && parts.get(1) == Some(&"sessions")
                && parts.get(3) == Some(&"join")
            {
                "/sessions/{id}/join".to_string()
            } else {
                "/other".to_string()
            }
        }
    }
}

// ============================================================================
// Provider Metrics
// ============================================================================

/// Record a provider API call
///
/// Metric: `vc_provider_calls_total`, `vc_provider_call_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_provider_call(operation: &str, status: &str, duration: Duration) {
    histogram!("vc_provider_call_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("vc_provider_calls_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a fallback to mock values after a provider failure
///
/// Metric: `vc_provider_fallbacks_total`
/// Labels: `operation`
pub fn record_provider_fallback(operation: &str) {
    counter!("vc_provider_fallbacks_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Record a join outcome
///
/// Metric: `vc_session_joins_total`
/// Labels: `outcome`
pub fn record_session_join(outcome: &str) {
    counter!("vc_session_joins_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a lost conditional write inside the join retry loop
///
/// Metric: `vc_join_conflicts_total`
pub fn record_join_conflict() {
    counter!("vc_join_conflicts_total").increment(1);
}

/// Record a created session
///
/// Metric: `vc_sessions_created_total`
/// Labels: `kind`
pub fn record_session_created(kind: &str) {
    counter!("vc_sessions_created_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}
