//! Listener ownership and coordinated graceful shutdown.
//!
//! State moves `Starting -> Listening -> ShuttingDown -> Stopped` and is
//! published on a `watch` channel. After the shutdown signal the listener
//! stops accepting, in-flight requests finish, component loops are
//! cancelled and the background supervisor is drained. All of that shares
//! one grace deadline; overrunning it is reported as an error and the state
//! never reaches `Stopped`.

use crate::services::BackgroundTasks;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Listening,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("Server failed: {0}")]
    Serve(String),

    #[error("Grace window of {grace:?} exceeded with {outstanding_tasks} background tasks outstanding")]
    GraceExceeded {
        grace: Duration,
        outstanding_tasks: usize,
    },
}

pub struct Lifecycle {
    state: watch::Sender<LifecycleState>,
    grace: Duration,
    background: BackgroundTasks,
    components: CancellationToken,
}

impl Lifecycle {
    /// `components` is cancelled when shutdown begins; long-running loops
    /// such as the limiter sweep should hold a child of it.
    pub fn new(grace: Duration, background: BackgroundTasks, components: CancellationToken) -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self {
            state,
            grace,
            background,
            components,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Serve `app` on `listener` until `signal` resolves, then shut down.
    pub async fn serve<F>(self, listener: TcpListener, app: Router, signal: F) -> Result<(), ShutdownError>
    where
        F: Future<Output = ()> + Send,
    {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ShutdownError::Serve(format!("listener has no local address: {e}")))?;

        let stop_accepting = CancellationToken::new();
        let server_stop = stop_accepting.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { server_stop.cancelled().await })
            .await
        });

        self.state.send_replace(LifecycleState::Listening);
        info!(address = %local_addr, "Sales API listening");

        tokio::select! {
            _ = signal => {}
            result = &mut server => {
                // Server ended without a shutdown request
                self.components.cancel();
                self.state.send_replace(LifecycleState::Stopped);
                return match result {
                    Ok(Ok(())) => Err(ShutdownError::Serve("server exited unexpectedly".to_string())),
                    Ok(Err(e)) => Err(ShutdownError::Serve(e.to_string())),
                    Err(e) => Err(ShutdownError::Serve(e.to_string())),
                };
            }
        }

        self.state.send_replace(LifecycleState::ShuttingDown);
        info!(
            grace_seconds = self.grace.as_secs_f64(),
            background_tasks = self.background.outstanding(),
            "Shutdown started, draining in-flight requests and background tasks"
        );

        stop_accepting.cancel();
        self.components.cancel();

        let drained = tokio::time::timeout(self.grace, async {
            tokio::join!(server, self.background.drain())
        })
        .await;

        match drained {
            Ok((server_result, ())) => {
                match server_result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "Server reported an error while draining"),
                    Err(e) => warn!(error = %e, "Server task failed while draining"),
                }
                self.state.send_replace(LifecycleState::Stopped);
                info!("Shutdown complete");
                Ok(())
            }
            Err(_) => {
                let outstanding_tasks = self.background.outstanding();
                error!(
                    grace_seconds = self.grace.as_secs_f64(),
                    outstanding_tasks,
                    "Shutdown grace window exceeded"
                );
                Err(ShutdownError::GraceExceeded {
                    grace: self.grace,
                    outstanding_tasks,
                })
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => {
                error!("Failed to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
