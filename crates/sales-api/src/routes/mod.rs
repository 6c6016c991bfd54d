//! HTTP routes for the sales API.
//!
//! Defines the application state, the route table with its per-route
//! guards, and the fixed middleware pipeline wrapped around it.

use crate::config::Config;
use crate::handlers::{self, products, tokens, users};
use crate::middleware::{
    authenticate, http_metrics_middleware, panic_response, rate_limit, report_server_faults,
    require_authenticated, require_permission, AuthState, PermissionGuard,
};
use crate::observability::RequestMetrics;
use crate::services::{ActivationNotifier, BackgroundTasks, ClientLimiter};
use crate::stores::{CredentialStore, PermissionStore, ProductStore, UserStore};
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

/// Upper bound on credential lookup plus handler time, below the shutdown
/// grace window.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state shared across all handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub credentials: Arc<dyn CredentialStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub users: Arc<dyn UserStore>,
    pub products: Arc<dyn ProductStore>,
    pub notifier: Arc<dyn ActivationNotifier>,
    pub limiter: Arc<ClientLimiter>,
    pub metrics: Arc<RequestMetrics>,
    pub background: BackgroundTasks,
}

/// Build the application routes wrapped in the full pipeline.
///
/// | route | guard |
/// |---|---|
/// | `GET /health`, `GET /v1/metrics`, `GET /metrics` | none |
/// | `POST /v1/users`, `PUT /v1/users/activate` | none |
/// | `POST /v1/tokens/authentication` | none |
/// | `DELETE /v1/tokens/authentication`, `GET /v1/users/profile` | authenticated |
/// | `PUT /v1/users/profile/:id` | authenticated, own id only |
/// | `GET /v1/users`, `GET /v1/users/:id` | `users:view` |
/// | `PUT /v1/users/:id` | `users:update` |
/// | `DELETE /v1/users/:id` | `users:delete` |
/// | `GET /v1/products`, `GET /v1/products/:id` | `product:view` |
/// | `POST /v1/products` | `product:create` |
/// | `PUT /v1/products/:id` | `product:update` |
/// | `DELETE /v1/products/:id` | `product:delete` |
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let permissions = Arc::clone(&state.permissions);
    let permit = |code: &'static str| {
        middleware::from_fn_with_state(
            PermissionGuard::new(Arc::clone(&permissions), code),
            require_permission,
        )
    };
    let authenticated = || middleware::from_fn(require_authenticated);

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/v1/metrics", get(handlers::metrics_snapshot))
        .route("/v1/users", post(users::register_user))
        .route("/v1/users/activate", put(users::activate_user))
        .route(
            "/v1/tokens/authentication",
            post(tokens::create_authentication_token)
                .merge(delete(tokens::delete_authentication_tokens).route_layer(authenticated())),
        )
        .route(
            "/v1/users/profile",
            get(users::show_profile).route_layer(authenticated()),
        )
        .route(
            "/v1/users",
            get(users::list_users).route_layer(permit("users:view")),
        )
        .route(
            "/v1/users/profile/:id",
            put(users::update_profile).route_layer(authenticated()),
        )
        .route(
            "/v1/users/:id",
            get(users::show_user)
                .route_layer(permit("users:view"))
                .merge(put(users::update_user).route_layer(permit("users:update")))
                .merge(delete(users::delete_user).route_layer(permit("users:delete"))),
        )
        .route(
            "/v1/products",
            get(products::list_products)
                .route_layer(permit("product:view"))
                .merge(post(products::create_product).route_layer(permit("product:create"))),
        )
        .route(
            "/v1/products/:id",
            get(products::show_product)
                .route_layer(permit("product:view"))
                .merge(put(products::update_product).route_layer(permit("product:update")))
                .merge(delete(products::delete_product).route_layer(permit("product:delete"))),
        )
        .with_state(Arc::clone(&state));

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    pipeline(public_routes.merge(metrics_routes), &state)
}

/// Wrap `router` in the request pipeline.
///
/// Order, outermost first: fault reporting and panic recovery, tracing,
/// CORS, metrics, rate limiting, the request timeout, authentication. Route
/// guards run inside the router. The timeout covers the credential lookup
/// as well as the handler.
pub fn pipeline(router: Router, state: &AppState) -> Router {
    let auth_state = AuthState {
        credentials: Arc::clone(&state.credentials),
    };

    router
        .layer(middleware::from_fn_with_state(auth_state, authenticate))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.limiter),
            rate_limit,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.metrics),
            http_metrics_middleware,
        ))
        .layer(cors_layer(&state.config.cors_trusted_origins))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(report_server_faults))
}

/// Cross-origin policy for the trusted origins. Unparseable origins and the
/// `*` wildcard are skipped with a warning; an empty list allows no
/// cross-origin requests.
fn cors_layer(trusted_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter_map(|origin| {
            if origin == "*" {
                warn!("Ignoring wildcard CORS origin, list trusted origins explicitly");
                return None;
            }
            match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::OPTIONS, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
