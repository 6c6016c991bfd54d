//! Out-of-band delivery of activation tokens.

use crate::models::Principal;
use common::secret::SecretString;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Activation notice delivery failed: {0}")]
    Delivery(String),
}

/// Delivers an activation token to a newly registered principal.
///
/// Called from a background task; implementations may be slow.
#[async_trait::async_trait]
pub trait ActivationNotifier: Send + Sync {
    async fn send_activation(
        &self,
        recipient: &Principal,
        token: &SecretString,
    ) -> Result<(), NotifyError>;
}

/// Records the delivery in the log. The token itself is never logged.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl ActivationNotifier for LogNotifier {
    #[instrument(skip_all, fields(user_id = %recipient.id))]
    async fn send_activation(
        &self,
        recipient: &Principal,
        _token: &SecretString,
    ) -> Result<(), NotifyError> {
        info!("Activation notice queued for delivery");
        Ok(())
    }
}

pub mod mock {
    use super::*;
    use common::secret::ExposeSecret;
    use common::types::PrincipalId;
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Notifier that keeps every delivered token so tests can complete
    /// the activation flow.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        deliveries: Mutex<Vec<(PrincipalId, String)>>,
        delay: Option<Duration>,
        fail: bool,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Sleep before recording each delivery.
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub async fn deliveries(&self) -> Vec<(PrincipalId, String)> {
            self.deliveries.lock().await.clone()
        }

        pub async fn last_token_for(&self, id: PrincipalId) -> Option<String> {
            self.deliveries
                .lock()
                .await
                .iter()
                .rev()
                .find(|(owner, _)| *owner == id)
                .map(|(_, token)| token.clone())
        }
    }

    #[async_trait::async_trait]
    impl ActivationNotifier for RecordingNotifier {
        async fn send_activation(
            &self,
            recipient: &Principal,
            token: &SecretString,
        ) -> Result<(), NotifyError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(NotifyError::Delivery("mock notifier failure".to_string()));
            }
            self.deliveries
                .lock()
                .await
                .push((recipient.id, token.expose_secret().to_string()));
            Ok(())
        }
    }
}
