//! Authentication for the gate.
//!
//! - `jwks` - Key set fetching, resolution and refresh
//! - `jwt` - Bearer token verification
//! - `claims` - The verified identity attached to a call

pub mod claims;
pub mod jwks;
pub mod jwt;

pub use claims::VerifiedIdentity;
pub use jwks::{JwksClient, JwksOptions, KeySet, KeySourceError};
pub use jwt::{TokenVerifier, VerifierConfig};
