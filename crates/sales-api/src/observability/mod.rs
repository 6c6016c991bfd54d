//! Observability for the sales API.
//!
//! Two layers of request accounting live here:
//! - [`metrics::RequestMetrics`], process-wide atomic counters served as a
//!   JSON snapshot at `/v1/metrics`,
//! - `metrics` facade counters and histograms exported in Prometheus text
//!   format at `/metrics`.
//!
//! Neither layer carries principal identifiers, emails or token material.

pub mod metrics;

pub use metrics::{MetricsSnapshot, RequestMetrics};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "sales_api=debug,tower_http=debug";

/// Install the global tracing subscriber.
///
/// JSON output in production, human-readable output elsewhere.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
