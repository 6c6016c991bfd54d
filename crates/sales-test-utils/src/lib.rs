//! # Sales Test Utilities
//!
//! Shared test utilities for the sales API.
//!
//! This crate provides:
//! - Fixed test configuration and principal builders
//! - [`TestWorld`], the in-memory stores and components behind one app state
//! - [`TestApiServer`], a real server on a random port with a shutdown trigger
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sales_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let world = TestWorld::new();
//!     let token = world
//!         .seed(TestPrincipalBuilder::new(7).build(), &["product:view"])
//!         .await;
//!
//!     let server = TestApiServer::spawn(world).await?;
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/v1/products", server.url()))
//!         .bearer_auth(&token)
//!         .send()
//!         .await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;

pub use fixtures::*;
pub use server_harness::*;
