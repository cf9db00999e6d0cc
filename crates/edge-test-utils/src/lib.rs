//! # Edge Test Utilities
//!
//! Shared test utilities for the edge gateway.
//!
//! This crate provides:
//! - ES256 signing keys (`TestSigningKey`)
//! - Load-balancer style token construction (`AlbTokenBuilder`)
//! - A mock regional key server (`MockKeyServer`)
//! - Server test harness (`TestGateway` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use edge_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let keys = MockKeyServer::start().await;
//!     let key = TestSigningKey::generate("kid-1");
//!     keys.publish(&key).await;
//!
//!     let gateway = TestGateway::spawn(&keys).await?;
//!     let token = AlbTokenBuilder::new().for_subject("alice").sign(&key);
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/api/v1/me", gateway.url()))
//!         .header("x-amzn-oidc-identity", "alice")
//!         .header("x-amzn-oidc-data", token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod key_server;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use key_server::*;
pub use server_harness::*;
pub use token_builders::*;
