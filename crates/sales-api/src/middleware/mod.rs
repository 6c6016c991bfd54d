//! Middleware for the sales API.
//!
//! # Components
//!
//! - `recovery` - Server-fault reporting and panic conversion (outermost)
//! - `http_metrics` - Request accounting with a drop guard
//! - `rate_limit` - Per-client token bucket admission
//! - `auth` - Bearer credential verification, attaches the request principal
//! - `authorize` - Per-route guards (authenticated, active, permission)

pub mod auth;
pub mod authorize;
pub mod http_metrics;
pub mod rate_limit;
pub mod recovery;

pub use auth::{authenticate, AuthState};
pub use authorize::{require_active, require_authenticated, require_permission, PermissionGuard};
pub use http_metrics::http_metrics_middleware;
pub use rate_limit::rate_limit;
pub use recovery::{panic_response, report_server_faults};
