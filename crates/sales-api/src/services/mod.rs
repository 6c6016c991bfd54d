//! Stateful components owned by the application and shared with the
//! request pipeline.

pub mod background;
pub mod limiter;
pub mod notifier;

pub use background::BackgroundTasks;
pub use limiter::ClientLimiter;
pub use notifier::{ActivationNotifier, LogNotifier, NotifyError};
