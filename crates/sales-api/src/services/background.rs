//! Supervisor for fire-and-forget work started by request handlers.
//!
//! Every task is registered with a [`TaskTracker`] before it starts and
//! deregistered when it ends, whatever the outcome. Failures and panics are
//! logged and never reach the request that started the task. Shutdown closes
//! the tracker and waits for it to empty.

use crate::observability::metrics::{
    record_background_task, record_background_task_finished, record_background_task_started,
};
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use tokio::task::JoinError;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` in the background under `name`.
    ///
    /// The future runs as its own tokio task so that a panic unwinds only
    /// that task; the tracked wrapper observes the outcome and logs it.
    pub fn run<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let handle = tokio::spawn(task);
        record_background_task_started();

        self.tracker.spawn(async move {
            match handle.await {
                Ok(Ok(())) => {
                    debug!(task = name, "Background task completed");
                    record_background_task(name, "ok");
                }
                Ok(Err(e)) => {
                    error!(task = name, error = %e, "Background task failed");
                    record_background_task(name, "error");
                }
                Err(join_error) => {
                    log_join_error(name, join_error);
                }
            }
            record_background_task_finished();
        });
    }

    /// Number of tasks registered and not yet finished.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Close the supervisor and wait until every registered task has ended.
    ///
    /// Tasks started after the close are still waited for.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

fn log_join_error(name: &'static str, join_error: JoinError) {
    if join_error.is_panic() {
        let message = panic_message(join_error.into_panic());
        error!(task = name, panic = %message, "Background task panicked");
        record_background_task(name, "panic");
    } else {
        warn!(task = name, "Background task was cancelled");
        record_background_task(name, "cancelled");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
