//! Test server harness for E2E testing
//!
//! Provides `TestApiServer`, a real sales API server driven by the
//! production [`Lifecycle`] so tests can trigger and observe shutdown.

use crate::fixtures::TestWorld;
use sales_api::lifecycle::{Lifecycle, LifecycleState, ShutdownError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Test harness for spawning the sales API in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> anyhow::Result<()> {
///     let server = TestApiServer::spawn(TestWorld::new()).await?;
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     server.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct TestApiServer {
    addr: SocketAddr,
    world: TestWorld,
    states: watch::Receiver<LifecycleState>,
    components: CancellationToken,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<(), ShutdownError>>>,
}

impl TestApiServer {
    /// Spawn with the grace window from the world's configuration.
    pub async fn spawn(world: TestWorld) -> Result<Self, anyhow::Error> {
        let grace = world.config.shutdown_grace;
        Self::spawn_with_grace(world, grace).await
    }

    /// Spawn a server on `127.0.0.1:0` and wait until it is listening.
    pub async fn spawn_with_grace(
        world: TestWorld,
        grace: Duration,
    ) -> Result<Self, anyhow::Error> {
        let app = world.router();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let components = CancellationToken::new();
        let lifecycle = Lifecycle::new(grace, world.background.clone(), components.clone());
        let mut states = lifecycle.subscribe();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(lifecycle.serve(listener, app, async move {
            let _ = shutdown_rx.await;
        }));

        states
            .wait_for(|s| *s == LifecycleState::Listening)
            .await
            .map_err(|e| anyhow::anyhow!("Server never started listening: {}", e))?;

        Ok(Self {
            addr,
            world,
            states,
            components,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stores and components behind the running server.
    pub fn world(&self) -> &TestWorld {
        &self.world
    }

    pub fn state(&self) -> LifecycleState {
        *self.states.borrow()
    }

    /// Receiver for lifecycle transitions.
    pub fn states(&self) -> watch::Receiver<LifecycleState> {
        self.states.clone()
    }

    /// Token cancelled when shutdown begins.
    pub fn components(&self) -> CancellationToken {
        self.components.clone()
    }

    /// Send the shutdown signal without waiting for the result.
    pub fn trigger_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Send the shutdown signal and wait for the lifecycle to finish.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        self.trigger_shutdown();
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| ShutdownError::Serve(format!("lifecycle task failed: {}", e)))?,
            None => Ok(()),
        }
    }
}

impl Drop for TestApiServer {
    fn drop(&mut self) {
        // Abort the server task if the test did not shut it down
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
