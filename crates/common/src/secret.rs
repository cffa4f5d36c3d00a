//! Secret types for protecting bearer tokens from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for every credential that passes
//! through the pipeline. `SecretString` implements `Debug` with redaction,
//! so any struct deriving `Debug` around a token stays safe to log.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Outbound {
//!     target: String,
//!     bearer: SecretString,
//! }
//!
//! let call = Outbound {
//!     target: "policy".to_string(),
//!     bearer: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! assert!(!format!("{call:?}").contains("eyJhbGciOi"));
//! assert_eq!(call.bearer.expose_secret(), "eyJhbGciOi...");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
