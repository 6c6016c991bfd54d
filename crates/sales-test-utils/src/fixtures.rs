//! Test configuration, principal builders and the in-memory world.

use axum::Router;
use chrono::{Duration, Utc};
use common::secret::{ExposeSecret, SecretString};
use common::types::PrincipalId;
use metrics_exporter_prometheus::PrometheusBuilder;
use sales_api::config::{Config, MIN_BCRYPT_COST};
use sales_api::crypto;
use sales_api::models::{Principal, Scope};
use sales_api::observability::RequestMetrics;
use sales_api::routes::{self, AppState};
use sales_api::services::notifier::mock::RecordingNotifier;
use sales_api::services::{BackgroundTasks, ClientLimiter};
use sales_api::stores::mock::{
    MockCredentialStore, MockPermissionStore, MockProductStore, MockUserStore,
};
use sales_api::stores::{CredentialStore, PermissionStore};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Password accepted for every principal seeded through [`TestWorld::seed`].
pub const TEST_PASSWORD: &str = "Correct-Horse-42";

/// Build a test configuration. `overrides` replace or add variables.
///
/// The limiter is disabled unless an override enables it, and the bcrypt
/// cost is the minimum allowed.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars = HashMap::from([
        (
            "DATABASE_URL".to_string(),
            "postgresql://test/test".to_string(),
        ),
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ("ENVIRONMENT".to_string(), "test".to_string()),
        ("LIMITER_ENABLED".to_string(), "false".to_string()),
        ("BCRYPT_COST".to_string(), MIN_BCRYPT_COST.to_string()),
        ("SHUTDOWN_GRACE_SECONDS".to_string(), "5".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }

    Config::from_vars(&vars).expect("test configuration should be valid")
}

/// bcrypt hash of [`TEST_PASSWORD`], computed once per process.
pub fn test_password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| {
        crypto::hash_password(&SecretString::from(TEST_PASSWORD), MIN_BCRYPT_COST)
            .expect("test password should hash")
    })
}

/// Builder for test principals. Active `cashier` by default.
///
/// # Example
/// ```rust,ignore
/// let principal = TestPrincipalBuilder::new(3)
///     .with_email("inactive@example.com")
///     .inactive()
///     .build();
/// ```
pub struct TestPrincipalBuilder {
    principal: Principal,
}

impl TestPrincipalBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            principal: Principal {
                id: PrincipalId(id),
                first_name: "Test".to_string(),
                last_name: format!("User{}", id),
                email: format!("user{}@example.com", id),
                role: "cashier".to_string(),
                is_active: true,
            },
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.principal.email = email.to_string();
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.principal.role = role.to_string();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.principal.is_active = false;
        self
    }

    pub fn build(self) -> Principal {
        self.principal
    }
}

/// In-memory stores and components wired into one [`AppState`].
///
/// Handles are kept so tests can seed data and inspect call counters while
/// requests run against the real router.
pub struct TestWorld {
    pub config: Config,
    pub users: Arc<MockUserStore>,
    pub credentials: Arc<MockCredentialStore>,
    pub permissions: Arc<MockPermissionStore>,
    pub products: Arc<MockProductStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub limiter: Arc<ClientLimiter>,
    pub metrics: Arc<RequestMetrics>,
    pub background: BackgroundTasks,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_config(test_config(&[]))
    }

    pub fn with_config(config: Config) -> Self {
        let users = Arc::new(MockUserStore::new());
        Self {
            credentials: Arc::new(MockCredentialStore::new(Arc::clone(&users))),
            users,
            permissions: Arc::new(MockPermissionStore::new()),
            products: Arc::new(MockProductStore::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            limiter: Arc::new(ClientLimiter::new(config.limiter)),
            metrics: Arc::new(RequestMetrics::new()),
            background: BackgroundTasks::new(),
            config,
        }
    }

    /// Replace the notifier, e.g. with a slow or failing one.
    pub fn with_notifier(mut self, notifier: RecordingNotifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            config: self.config.clone(),
            credentials: self.credentials.clone(),
            permissions: self.permissions.clone(),
            users: self.users.clone(),
            products: self.products.clone(),
            notifier: self.notifier.clone(),
            limiter: Arc::clone(&self.limiter),
            metrics: Arc::clone(&self.metrics),
            background: self.background.clone(),
        })
    }

    /// The full application router, using a recorder that is not installed
    /// globally.
    pub fn router(&self) -> Router {
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        routes::build_routes(self.state(), metrics_handle)
    }

    /// Store `principal` with [`TEST_PASSWORD`], grant `codes`, and return a
    /// fresh authentication token for it.
    pub async fn seed(&self, principal: Principal, codes: &[&str]) -> String {
        let id = principal.id;
        self.users.add(principal, test_password_hash()).await;
        self.grant(id, codes).await;
        self.issue_token(id, Scope::Authentication, Duration::hours(1))
            .await
    }

    pub async fn grant(&self, id: PrincipalId, codes: &[&str]) {
        self.permissions
            .grant(id, codes)
            .await
            .expect("mock grant should succeed");
    }

    /// Issue a credential through the same generator the handlers use. A
    /// negative `ttl` yields an already expired credential.
    pub async fn issue_token(&self, id: PrincipalId, scope: Scope, ttl: Duration) -> String {
        let credential =
            crypto::generate_credential(id, ttl, scope).expect("credential should generate");
        self.credentials
            .insert(&credential)
            .await
            .expect("mock insert should succeed");
        credential.plaintext.expose_secret().to_string()
    }

    /// Token whose expiry is exactly now, which no longer authenticates.
    pub async fn issue_token_expiring_now(&self, id: PrincipalId) -> String {
        let plaintext = "AAAAAAAAAAAAAAAAAAAAAA".to_string();
        self.credentials
            .issue(id, &plaintext, Scope::Authentication, Utc::now())
            .await;
        plaintext
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
