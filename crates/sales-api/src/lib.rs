//! Sales API Service Library
//!
//! Request-handling core for the sales API: per-client rate limiting, bearer
//! credential authentication, permission-based authorization, request
//! metrics, background task supervision and graceful shutdown.
//!
//! # Modules
//!
//! - `config` - Service configuration
//! - `crypto` - Credential generation and password hashing
//! - `errors` - Error types and the JSON error envelope
//! - `handlers` - HTTP request handlers
//! - `lifecycle` - Listener ownership and graceful shutdown
//! - `middleware` - The request pipeline stages
//! - `models` - Principals, scopes and permissions
//! - `observability` - Tracing setup and request metrics
//! - `repositories` - Database access layer
//! - `routes` - Route table and pipeline assembly
//! - `services` - Limiter, background supervisor and notifier
//! - `stores` - Store traits with Postgres and in-memory implementations

pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod stores;
