//! # Gate Test Utilities
//!
//! Shared test utilities for the gate.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed RSA keys and certificates, seeded Ed25519 keypairs)
//! - A claims/token builder (`TestTokenBuilder`)
//! - Mock upstreams (`MockJwks`, `MockOpa`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gate_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let jwks = MockJwks::start(jwks_document(vec![RsaSigner::One.jwk_x5c()])).await;
//!
//!     let token = TestTokenBuilder::new()
//!         .for_user("alice")
//!         .sign_rsa(RsaSigner::One, Algorithm::RS256);
//! }
//! ```

pub mod crypto_fixtures;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jsonwebtoken::Algorithm;
pub use server_harness::*;
pub use token_builders::*;
