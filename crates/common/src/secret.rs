//! Secret types for keeping credentials out of logs.
//!
//! Re-exports [`secrecy`] types. Bearer token plaintexts and user passwords
//! travel through the service as [`SecretString`]; only the SHA-256 hash of a
//! token (or the bcrypt hash of a password) is ever persisted.
//!
//! `SecretString` implements `Debug` with redaction, so deriving `Debug` on a
//! request payload that contains one is safe for `tracing` fields.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct LoginRequest {
//!     email: String,
//!     password: SecretString,
//! }
//!
//! let req = LoginRequest {
//!     email: "alice@example.com".to_string(),
//!     password: SecretString::from("Hunter2!x"),
//! };
//!
//! assert!(!format!("{req:?}").contains("Hunter2!x"));
//! assert_eq!(req.password.expose_secret(), "Hunter2!x");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
