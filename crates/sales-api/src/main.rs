use sales_api::config::Config;
use sales_api::lifecycle::{shutdown_signal, Lifecycle};
use sales_api::observability::{init_tracing, metrics::init_metrics_recorder, RequestMetrics};
use sales_api::routes::{self, AppState};
use sales_api::services::{limiter::SWEEP_INTERVAL, BackgroundTasks, ClientLimiter, LogNotifier};
use sales_api::stores::postgres::{
    PgCredentialStore, PgPermissionStore, PgProductStore, PgUserStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration before tracing so the output format can follow it
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(config.is_production());

    info!("Starting Sales API");
    info!(
        environment = %config.environment,
        bind_address = %config.bind_address,
        limiter_enabled = config.limiter.enabled,
        limiter_rps = config.limiter.rps,
        limiter_burst = config.limiter.burst,
        shutdown_grace_seconds = config.shutdown_grace.as_secs(),
        "Configuration loaded successfully"
    );

    // Install the Prometheus recorder before anything records metrics
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // Initialize database connection pool
    info!("Connecting to database...");
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(900))
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    info!("Database connection established");

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let components = CancellationToken::new();
    let background = BackgroundTasks::new();
    let limiter = Arc::new(ClientLimiter::new(config.limiter));

    if limiter.is_enabled() {
        tokio::spawn(Arc::clone(&limiter).run_sweeper(SWEEP_INTERVAL, components.child_token()));
    }

    let grace = config.shutdown_grace;
    let state = Arc::new(AppState {
        credentials: Arc::new(PgCredentialStore::new(db_pool.clone())),
        permissions: Arc::new(PgPermissionStore::new(db_pool.clone())),
        users: Arc::new(PgUserStore::new(db_pool.clone())),
        products: Arc::new(PgProductStore::new(db_pool.clone())),
        notifier: Arc::new(LogNotifier),
        limiter,
        metrics: Arc::new(RequestMetrics::new()),
        background: background.clone(),
        config,
    });

    let app = routes::build_routes(state, metrics_handle);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let lifecycle = Lifecycle::new(grace, background, components);

    lifecycle
        .serve(listener, app, shutdown_signal())
        .await
        .map_err(|e| {
            error!("Shutdown did not complete cleanly: {}", e);
            e
        })?;

    db_pool.close().await;
    info!("Sales API shutdown complete");

    Ok(())
}
