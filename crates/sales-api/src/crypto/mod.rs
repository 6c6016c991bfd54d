use crate::config::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use crate::errors::ApiError;
use crate::models::{Credential, Scope};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use common::secret::{ExposeSecret, SecretString};
use common::types::PrincipalId;
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use tracing::instrument;

/// Random bytes behind every bearer token.
pub const TOKEN_ENTROPY_BYTES: usize = 16;

/// Length of a token plaintext: 16 bytes, base64url without padding.
pub const TOKEN_PLAINTEXT_LENGTH: usize = 22;

/// Lifetime of an authentication token issued at login.
pub const AUTHENTICATION_TOKEN_TTL_HOURS: i64 = 24;

/// Lifetime of an activation token issued at registration.
pub const ACTIVATION_TOKEN_TTL_HOURS: i64 = 72;

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(len: usize) -> Result<Vec<u8>, ApiError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|e| ApiError::Crypto(format!("Random bytes generation failed: {}", e)))?;
    Ok(bytes)
}

/// SHA-256 of a token plaintext. This is the only form a store ever sees.
pub fn hash_token(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

/// Shape check performed before any store lookup.
pub fn is_well_formed_token(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_PLAINTEXT_LENGTH
}

/// Issue a new credential for `principal_id`.
///
/// The plaintext is returned inside the credential as a `SecretString`; the
/// caller persists `hash` and hands the plaintext to the client once.
#[instrument(skip_all, fields(scope = %scope))]
pub fn generate_credential(
    principal_id: PrincipalId,
    ttl: Duration,
    scope: Scope,
) -> Result<Credential, ApiError> {
    let bytes = generate_random_bytes(TOKEN_ENTROPY_BYTES)?;
    let plaintext = general_purpose::URL_SAFE_NO_PAD.encode(&bytes);
    let hash = hash_token(&plaintext);

    Ok(Credential {
        plaintext: SecretString::from(plaintext),
        hash,
        principal_id,
        scope,
        expires_at: Utc::now() + ttl,
    })
}

/// Hash a password with bcrypt using the configured cost factor.
#[instrument(skip_all)]
pub fn hash_password(password: &SecretString, cost: u32) -> Result<String, ApiError> {
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
        return Err(ApiError::Crypto(format!(
            "Invalid bcrypt cost: {} (must be {}-{})",
            cost, MIN_BCRYPT_COST, MAX_BCRYPT_COST
        )));
    }

    bcrypt::hash(password.expose_secret(), cost)
        .map_err(|e| ApiError::Crypto(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a bcrypt hash
#[instrument(skip_all)]
pub fn verify_password(password: &SecretString, hash: &str) -> Result<bool, ApiError> {
    bcrypt::verify(password.expose_secret(), hash)
        .map_err(|e| ApiError::Crypto(format!("Password verification failed: {}", e)))
}
