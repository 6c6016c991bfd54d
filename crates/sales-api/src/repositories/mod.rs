//! sqlx query functions, one module per table group.
//!
//! Functions take a `&PgPool` and map driver errors to [`ApiError::Database`].
//! The trait implementations in [`crate::stores::postgres`] delegate here.
//!
//! [`ApiError::Database`]: crate::errors::ApiError::Database

pub mod permissions;
pub mod products;
pub mod tokens;
pub mod users;
