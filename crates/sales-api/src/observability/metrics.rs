//! Request counters and Prometheus metric definitions.
//!
//! Prometheus names use the `sales_` prefix, `_total` for counters and
//! `_seconds` for histograms. Labels are bounded: paths are normalized so
//! numeric ids collapse to `:id`.

use axum::http::StatusCode;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Process-wide request counters. Increment only.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    status_1xx: AtomicU64,
    status_2xx: AtomicU64,
    status_3xx: AtomicU64,
    status_4xx: AtomicU64,
    status_5xx: AtomicU64,
    cancelled: AtomicU64,
    processing_time_us: AtomicU64,
}

/// Point-in-time copy of [`RequestMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    pub total_responses_by_status: BTreeMap<&'static str, u64>,
    pub total_cancelled_requests: u64,
    pub total_processing_time_us: u64,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Account a finished response under its status class.
    pub fn response_sent(&self, status: StatusCode, elapsed: Duration) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.class_counter(status).fetch_add(1, Ordering::Relaxed);
        self.add_elapsed(elapsed);
    }

    /// Account a request whose future was dropped before producing a response.
    pub fn request_cancelled(&self, elapsed: Duration) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        self.add_elapsed(elapsed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            total_requests_received: load(&self.requests_received),
            total_responses_sent: load(&self.responses_sent),
            total_responses_by_status: BTreeMap::from([
                ("1xx", load(&self.status_1xx)),
                ("2xx", load(&self.status_2xx)),
                ("3xx", load(&self.status_3xx)),
                ("4xx", load(&self.status_4xx)),
                ("5xx", load(&self.status_5xx)),
            ]),
            total_cancelled_requests: load(&self.cancelled),
            total_processing_time_us: load(&self.processing_time_us),
        }
    }

    fn class_counter(&self, status: StatusCode) -> &AtomicU64 {
        match status.as_u16() {
            100..=199 => &self.status_1xx,
            200..=299 => &self.status_2xx,
            300..=399 => &self.status_3xx,
            400..=499 => &self.status_4xx,
            _ => &self.status_5xx,
        }
    }

    fn add_elapsed(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.processing_time_us.fetch_add(micros, Ordering::Relaxed);
    }
}

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
            Matcher::Prefix("sales_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `sales_http_requests_total`, `sales_http_request_duration_seconds`
/// Labels: `method`, `path`, `status_code`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let normalized_path = normalize_path(path);

    histogram!("sales_http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => normalized_path.clone(),
        "status_code" => status_code.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("sales_http_requests_total",
        "method" => method.to_string(),
        "path" => normalized_path,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Record a request dropped before a response was produced
///
/// Metric: `sales_http_requests_cancelled_total`
pub fn record_http_cancelled() {
    counter!("sales_http_requests_cancelled_total").increment(1);
}

// ============================================================================
// Guard Metrics
// ============================================================================

/// Record rate limit decision
///
/// Metric: `sales_rate_limit_decisions_total`
/// Labels: `action` (allowed, rejected)
pub fn record_rate_limit_decision(action: &str) {
    counter!("sales_rate_limit_decisions_total", "action" => action.to_string()).increment(1);
}

/// Record bearer authentication outcome
///
/// Metric: `sales_authentication_total`
/// Labels: `outcome` (anonymous, malformed, unknown, authenticated, error)
pub fn record_authentication(outcome: &str) {
    counter!("sales_authentication_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record an authorization denial
///
/// Metric: `sales_authorization_denied_total`
/// Labels: `reason` (unauthenticated, inactive, permission)
pub fn record_authorization_denied(reason: &str) {
    counter!("sales_authorization_denied_total", "reason" => reason.to_string()).increment(1);
}

// ============================================================================
// Background Task Metrics
// ============================================================================

/// Record background task completion
///
/// Metric: `sales_background_tasks_total`
/// Labels: `task`, `outcome` (ok, error, panic)
pub fn record_background_task(task: &str, outcome: &str) {
    counter!("sales_background_tasks_total",
        "task" => task.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Raise the outstanding background task gauge when a task is registered
///
/// Metric: `sales_background_tasks_outstanding`
pub fn record_background_task_started() {
    gauge!("sales_background_tasks_outstanding").increment(1.0);
}

/// Lower the outstanding background task gauge when a task ends, whatever
/// its outcome
///
/// Metric: `sales_background_tasks_outstanding`
pub fn record_background_task_finished() {
    gauge!("sales_background_tasks_outstanding").decrement(1.0);
}

/// Collapse numeric path segments to `:id`.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
