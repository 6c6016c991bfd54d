//! In-memory store doubles.
//!
//! Each double counts calls so tests can assert that a rejected request never
//! reached the store, and can be switched into a failing mode to exercise the
//! server-fault path.

use super::{
    CredentialStore, NewUser, PermissionStore, Product, ProductFilter, ProductStore, UserFilter,
    UserRecord, UserStore,
};
use crate::crypto::hash_token;
use crate::errors::ApiError;
use crate::models::{Credential, Page, PageRequest, Permissions, Principal, Scope};
use chrono::{DateTime, Utc};
use common::types::PrincipalId;
use std::cmp::Ordering as SortOrdering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Users keyed by id, shared with [`MockCredentialStore`] so that token
/// lookups observe activation.
#[derive(Debug)]
pub struct MockUserStore {
    users: Mutex<BTreeMap<PrincipalId, UserRecord>>,
    next_id: AtomicI64,
}

impl Default for MockUserStore {
    fn default() -> Self {
        Self {
            users: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MockUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user directly, bypassing registration.
    pub async fn add(&self, principal: Principal, password_hash: &str) {
        self.next_id
            .fetch_max(principal.id.get() + 1, Ordering::SeqCst);
        self.users.lock().await.insert(
            principal.id,
            UserRecord {
                principal,
                password_hash: password_hash.to_string(),
                version: 1,
            },
        );
    }

    pub async fn set_active(&self, id: PrincipalId, active: bool) {
        if let Some(record) = self.users.lock().await.get_mut(&id) {
            record.principal.is_active = active;
        }
    }

    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }
}

#[async_trait::async_trait]
impl UserStore for MockUserStore {
    async fn insert(&self, user: NewUser) -> Result<Principal, ApiError> {
        let mut users = self.users.lock().await;
        if users.values().any(|r| r.principal.email == user.email) {
            return Err(ApiError::validation(
                "email",
                "a user with this email address already exists",
            ));
        }

        let id = PrincipalId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let principal = Principal {
            id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role,
            is_active: false,
        };
        users.insert(
            id,
            UserRecord {
                principal: principal.clone(),
                password_hash: user.password_hash,
                version: 1,
            },
        );
        Ok(principal)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, ApiError> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|r| r.principal.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, ApiError> {
        Ok(self
            .users
            .lock()
            .await
            .get(&id)
            .map(|r| r.principal.clone()))
    }

    async fn find_record_by_id(&self, id: PrincipalId) -> Result<Option<UserRecord>, ApiError> {
        Ok(self.users.lock().await.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &UserFilter,
        page: &PageRequest,
    ) -> Result<Page<Principal>, ApiError> {
        let mut matching: Vec<Principal> = self
            .users
            .lock()
            .await
            .values()
            .map(|r| r.principal.clone())
            .filter(|p| filter.matches(p))
            .collect();

        matching.sort_by(|a, b| {
            let order = match page.sort.column {
                "first_name" => a.first_name.cmp(&b.first_name),
                "last_name" => a.last_name.cmp(&b.last_name),
                "email" => a.email.cmp(&b.email),
                _ => a.id.cmp(&b.id),
            };
            directed(order, page.sort.descending).then(a.id.cmp(&b.id))
        });

        Ok(paged(matching, page))
    }

    async fn activate(&self, id: PrincipalId) -> Result<Principal, ApiError> {
        let mut users = self.users.lock().await;
        let record = users.get_mut(&id).ok_or(ApiError::EditConflict)?;
        record.principal.is_active = true;
        record.version += 1;
        Ok(record.principal.clone())
    }

    async fn update(&self, record: &UserRecord) -> Result<UserRecord, ApiError> {
        let mut users = self.users.lock().await;
        let id = record.principal.id;

        let taken = users
            .values()
            .any(|r| r.principal.id != id && r.principal.email == record.principal.email);
        if taken {
            return Err(ApiError::validation(
                "email",
                "a user with this email address already exists",
            ));
        }

        let stored = users
            .get_mut(&id)
            .filter(|stored| stored.version == record.version)
            .ok_or(ApiError::EditConflict)?;
        *stored = UserRecord {
            version: record.version + 1,
            ..record.clone()
        };
        Ok(stored.clone())
    }

    async fn delete(&self, id: PrincipalId) -> Result<bool, ApiError> {
        Ok(self.users.lock().await.remove(&id).is_some())
    }
}

fn directed(order: SortOrdering, descending: bool) -> SortOrdering {
    if descending {
        order.reverse()
    } else {
        order
    }
}

/// The total rides on each returned row in SQL, so a page past the end
/// reports zero here too.
fn paged<T>(matching: Vec<T>, page: &PageRequest) -> Page<T> {
    let total = i64::try_from(matching.len()).unwrap_or(i64::MAX);
    let items = page.slice(matching);
    Page {
        total_records: if items.is_empty() { 0 } else { total },
        items,
    }
}

#[derive(Debug, Clone)]
struct StoredCredential {
    hash: Vec<u8>,
    principal_id: PrincipalId,
    scope: Scope,
    expires_at: DateTime<Utc>,
}

/// Credential store that resolves principals through a [`MockUserStore`].
#[derive(Debug)]
pub struct MockCredentialStore {
    users: Arc<MockUserStore>,
    credentials: Mutex<Vec<StoredCredential>>,
    find_calls: AtomicUsize,
    failing: AtomicBool,
    lookup_delay_ms: AtomicU64,
}

impl MockCredentialStore {
    pub fn new(users: Arc<MockUserStore>) -> Self {
        Self {
            users,
            credentials: Mutex::new(Vec::new()),
            find_calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            lookup_delay_ms: AtomicU64::new(0),
        }
    }

    /// Store a credential by plaintext, as if it had been issued earlier.
    pub async fn issue(
        &self,
        principal_id: PrincipalId,
        plaintext: &str,
        scope: Scope,
        expires_at: DateTime<Utc>,
    ) {
        self.credentials.lock().await.push(StoredCredential {
            hash: hash_token(plaintext),
            principal_id,
            scope,
            expires_at,
        });
    }

    /// Number of `find_active` calls made.
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    /// Make every call return a database error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every `find_active` call sleep for `delay` first, like a pool
    /// waiting on a stuck connection.
    pub fn set_lookup_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.lookup_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub async fn count_for(&self, principal_id: PrincipalId, scope: Scope) -> usize {
        self.credentials
            .lock()
            .await
            .iter()
            .filter(|c| c.principal_id == principal_id && c.scope == scope)
            .count()
    }

    fn check_failing(&self) -> Result<(), ApiError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApiError::Database("Mock credential store error".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CredentialStore for MockCredentialStore {
    async fn find_active(
        &self,
        scope: Scope,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<Principal>, ApiError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.lookup_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.check_failing()?;

        let owner = self
            .credentials
            .lock()
            .await
            .iter()
            .find(|c| c.scope == scope && c.hash == token_hash && c.expires_at > now)
            .map(|c| c.principal_id);

        match owner {
            Some(id) => self.users.find_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn insert(&self, credential: &Credential) -> Result<(), ApiError> {
        self.check_failing()?;
        self.credentials.lock().await.push(StoredCredential {
            hash: credential.hash.clone(),
            principal_id: credential.principal_id,
            scope: credential.scope,
            expires_at: credential.expires_at,
        });
        Ok(())
    }

    async fn delete_all_for_scope(
        &self,
        principal_id: PrincipalId,
        scope: Scope,
    ) -> Result<(), ApiError> {
        self.check_failing()?;
        self.credentials
            .lock()
            .await
            .retain(|c| !(c.principal_id == principal_id && c.scope == scope));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockPermissionStore {
    grants: Mutex<HashMap<PrincipalId, BTreeSet<String>>>,
    lookups: AtomicUsize,
    failing: AtomicBool,
}

impl MockPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn revoke(&self, principal_id: PrincipalId, code: &str) {
        if let Some(codes) = self.grants.lock().await.get_mut(&principal_id) {
            codes.remove(code);
        }
    }

    /// Number of `permissions_for` calls made.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl PermissionStore for MockPermissionStore {
    async fn permissions_for(&self, principal_id: PrincipalId) -> Result<Permissions, ApiError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApiError::Database("Mock permission store error".to_string()));
        }

        Ok(self
            .grants
            .lock()
            .await
            .get(&principal_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn grant(&self, principal_id: PrincipalId, codes: &[&str]) -> Result<(), ApiError> {
        self.grants
            .lock()
            .await
            .entry(principal_id)
            .or_default()
            .extend(codes.iter().map(|c| c.to_string()));
        Ok(())
    }

    async fn clear(&self, principal_id: PrincipalId) -> Result<(), ApiError> {
        self.grants.lock().await.remove(&principal_id);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockProductStore {
    products: Mutex<BTreeMap<i64, Product>>,
    next_id: AtomicI64,
    calls: AtomicUsize,
}

impl Default for MockProductStore {
    fn default() -> Self {
        Self {
            products: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            calls: AtomicUsize::new(0),
        }
    }
}

impl MockProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ProductStore for MockProductStore {
    async fn insert(&self, name: &str, price: f64) -> Result<Product, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let product = Product {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            price,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        self.products
            .lock()
            .await
            .insert(product.id, product.clone());
        Ok(product)
    }

    async fn get(&self, id: i64) -> Result<Option<Product>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.products.lock().await.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &ProductFilter,
        page: &PageRequest,
    ) -> Result<Page<Product>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut matching: Vec<Product> = self
            .products
            .lock()
            .await
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let order = match page.sort.column {
                "name" => a.name.cmp(&b.name),
                "price" => a.price.total_cmp(&b.price),
                _ => a.id.cmp(&b.id),
            };
            directed(order, page.sort.descending).then(a.id.cmp(&b.id))
        });

        Ok(paged(matching, page))
    }

    async fn update(&self, product: &Product) -> Result<Product, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut products = self.products.lock().await;
        let stored = products
            .get_mut(&product.id)
            .filter(|stored| stored.version == product.version)
            .ok_or(ApiError::EditConflict)?;
        stored.name = product.name.clone();
        stored.price = product.price;
        stored.updated_at = Utc::now();
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64) -> Result<bool, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.products.lock().await.remove(&id).is_some())
    }
}
