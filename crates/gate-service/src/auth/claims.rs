//! Verified identity attached to a call after token verification.
//!
//! Claims are kept as the arbitrary JSON map that was signed so they can be
//! handed to the policy unchanged. The `sub` claim and the raw token are
//! redacted in Debug output to prevent exposure in logs.

use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::Header;
use serde_json::{Map, Value};
use std::fmt;

/// Identity established by a successfully verified bearer token.
#[derive(Clone)]
pub struct VerifiedIdentity {
    claims: Map<String, Value>,
    header: Header,
    token: SecretString,
}

impl VerifiedIdentity {
    pub fn new(claims: Map<String, Value>, header: Header, token: SecretString) -> Self {
        Self {
            claims,
            header,
            token,
        }
    }

    /// The decoded claims map, exactly as signed.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// The decoded JOSE header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The original token string.
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// The `sub` claim, when it is a string.
    pub fn subject(&self) -> Option<&str> {
        self.claims.get("sub").and_then(Value::as_str)
    }
}

/// Custom Debug implementation that redacts the `sub` claim and the token.
impl fmt::Debug for VerifiedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut claims = self.claims.clone();
        if claims.contains_key("sub") {
            claims.insert("sub".to_string(), Value::String("[REDACTED]".to_string()));
        }

        f.debug_struct("VerifiedIdentity")
            .field("claims", &claims)
            .field("alg", &self.header.alg)
            .field("kid", &self.header.kid)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
