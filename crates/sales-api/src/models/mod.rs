//! Domain types shared by the request pipeline, the stores and the handlers.

pub mod paging;

pub use paging::{Page, PageMetadata, PageRequest, Sort};

use crate::errors::ApiError;
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};
use common::secret::SecretString;
use common::types::PrincipalId;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Purpose a credential was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Activation,
    Authentication,
    PasswordReset,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
            Scope::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role assigned at registration. Only used to seed the permission set;
/// authorization itself checks permission codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Cashier,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Cashier => "cashier",
            Role::Guest => "guest",
        }
    }

    /// Permission codes granted to a freshly registered principal.
    pub fn default_permissions(&self) -> &'static [&'static str] {
        match self {
            Role::Admin => &[
                "sale:create",
                "sale:view",
                "sale:delete",
                "sale:update",
                "product:create",
                "product:view",
                "product:delete",
                "product:update",
                "users:create",
                "users:view",
                "users:delete",
                "users:update",
                "self:create",
                "self:view",
                "self:delete",
                "self:update",
            ],
            Role::Cashier => &[
                "sale:create",
                "sale:view",
                "product:create",
                "product:view",
                "users:view",
                "self:create",
                "self:view",
                "self:update",
            ],
            Role::Guest => &["product:view", "self:view"],
        }
    }
}

impl FromStr for Role {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "cashier" => Ok(Role::Cashier),
            "guest" => Ok(Role::Guest),
            _ => Err(ApiError::validation(
                "role",
                "must be one of the permitted values",
            )),
        }
    }
}

/// An identity resolved from a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
}

/// The principal attached to every request by the authentication stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPrincipal {
    Anonymous,
    Authenticated(Principal),
}

impl RequestPrincipal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, RequestPrincipal::Anonymous)
    }

    /// The authenticated principal, or `AuthenticationRequired`.
    pub fn authenticated(&self) -> Result<&Principal, ApiError> {
        match self {
            RequestPrincipal::Anonymous => Err(ApiError::AuthenticationRequired),
            RequestPrincipal::Authenticated(principal) => Ok(principal),
        }
    }

    /// The authenticated principal if its account is active.
    ///
    /// Checks run in order: anonymous first, then the active flag.
    pub fn active(&self) -> Result<&Principal, ApiError> {
        let principal = self.authenticated()?;
        if !principal.is_active {
            return Err(ApiError::InactiveAccount);
        }
        Ok(principal)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestPrincipal>()
            .cloned()
            .ok_or_else(|| {
                ApiError::Internal("request principal missing from extensions".to_string())
            })
    }
}

/// Extractor for handlers that need a concrete principal.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let principal = RequestPrincipal::from_request_parts(parts, state).await?;
        match principal {
            RequestPrincipal::Anonymous => Err(ApiError::AuthenticationRequired),
            RequestPrincipal::Authenticated(p) => Ok(AuthenticatedPrincipal(p)),
        }
    }
}

/// A bearer credential. The plaintext exists only between issue and the
/// response that hands it to the client; stores see the hash.
#[derive(Debug)]
pub struct Credential {
    pub plaintext: SecretString,
    pub hash: Vec<u8>,
    pub principal_id: PrincipalId,
    pub scope: Scope,
    pub expires_at: DateTime<Utc>,
}

/// Permission codes held by a principal. Membership is exact; there is no
/// hierarchy and no wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
