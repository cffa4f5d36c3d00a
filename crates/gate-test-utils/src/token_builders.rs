//! Builder patterns for test tokens
//!
//! Provides a fluent API for constructing claims and signing them with the
//! fixtures from `crypto_fixtures`.

use crate::crypto_fixtures::{RsaSigner, TestKeypair};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Builder for creating signed test JWTs
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_claim("role", "admin")
///     .expires_in(3600)
///     .sign_rsa(RsaSigner::One, Algorithm::RS256);
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
    kid: Option<Option<String>>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults (`sub`, `iat`, `exp` one hour out)
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(3600)).timestamp()),
        );
        Self { claims, kid: None }
    }

    /// Set the subject
    pub fn for_user(self, subject: &str) -> Self {
        self.with_claim("sub", subject)
    }

    /// Set an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.claims.insert(name.to_string(), value.into());
        self
    }

    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("exp", exp)
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        let nbf = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("nbf", nbf)
    }

    /// Override the `kid` header (default: the signing key's ID)
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = Some(Some(kid.to_string()));
        self
    }

    /// Omit the `kid` header
    pub fn without_kid(mut self) -> Self {
        self.kid = Some(None);
        self
    }

    /// The claims as a JSON value
    pub fn claims(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Sign with an arbitrary key
    pub fn sign(&self, algorithm: Algorithm, key: &EncodingKey, default_kid: &str) -> String {
        let mut header = Header::new(algorithm);
        header.kid = match &self.kid {
            Some(kid) => kid.clone(),
            None => Some(default_kid.to_string()),
        };
        encode(&header, &self.claims, key).expect("test token must sign")
    }

    /// Sign with one of the fixed RSA keys (RS* or PS* algorithms)
    pub fn sign_rsa(&self, signer: RsaSigner, algorithm: Algorithm) -> String {
        self.sign(algorithm, &signer.encoding_key(), signer.kid())
    }

    /// Sign with an Ed25519 keypair
    pub fn sign_eddsa(&self, keypair: &TestKeypair) -> String {
        self.sign(Algorithm::EdDSA, &keypair.encoding_key(), &keypair.kid)
    }

    /// Build an unsigned token with an arbitrary header `alg` (e.g. `none`)
    pub fn unsigned_with_alg(&self, alg: &str) -> String {
        let mut header = json!({ "alg": alg, "typ": "JWT" });
        let kid = match &self.kid {
            Some(kid) => kid.clone(),
            None => Some("unsigned".to_string()),
        };
        if let Some(kid) = kid {
            header["kid"] = json!(kid);
        }

        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(self.claims().to_string())
        )
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
