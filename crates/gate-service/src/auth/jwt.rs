//! Bearer token verification.
//!
//! Validates incoming JWTs against keys from the key set client.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header `alg` must equal the configured algorithm before any
//!   signature work happens (algorithm substitution defense)
//! - The resolved key's family must match the configured algorithm
//! - `exp` is required; `nbf` is honoured when present
//! - Every failure maps to exactly one `AuthError` kind

use crate::auth::claims::VerifiedIdentity;
use crate::auth::jwks::{JwksClient, KeyFamily};
use crate::config::Config;
use crate::context::CallContext;
use crate::errors::AuthError;
use crate::observability::metrics;
use common::jwt::{decode_header, JwtHeaderError, DEFAULT_LEEWAY};
use common::secret::SecretString;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Verification settings.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// The only algorithm tokens may be signed with.
    pub algorithm: Algorithm,

    /// Leeway applied to `exp` and `nbf`.
    pub leeway: Duration,

    /// Required `iss`, if any.
    pub issuer: Option<String>,

    /// Required `aud`, if any.
    pub audience: Option<String>,
}

impl VerifierConfig {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            leeway: DEFAULT_LEEWAY,
            issuer: None,
            audience: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            algorithm: config.jwt_algorithm,
            leeway: Duration::from_secs(config.jwt_leeway_seconds),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = self.leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp"]);

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        validation
    }
}

/// JWT verifier backed by the key set client.
pub struct TokenVerifier {
    jwks_client: Arc<JwksClient>,
    config: VerifierConfig,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(jwks_client: Arc<JwksClient>, config: VerifierConfig) -> Self {
        let validation = config.validation();
        Self {
            jwks_client,
            config,
            validation,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.config.algorithm
    }

    /// Verify a token and return the identity it establishes.
    ///
    /// Key lookup honours the call's deadline if an on-demand key set
    /// refresh is needed.
    ///
    /// # Errors
    ///
    /// - `TokenMalformed` - oversized or structurally invalid token
    /// - `InvalidKeyId` - no `kid`, or `kid` not in the key set
    /// - `UnexpectedSigningMethod` - header `alg` differs from the configured one
    /// - `TokenInvalid` - bad signature, missing `exp`, issuer/audience mismatch
    /// - `TokenExpired` / `TokenNotActive` - outside the validity window
    #[instrument(skip_all, name = "gate.auth.verify")]
    pub async fn verify(&self, token: &str, ctx: &CallContext) -> Result<VerifiedIdentity, AuthError> {
        let result = self.verify_inner(token, ctx).await;

        match &result {
            Ok(_) => {
                metrics::record_token_verification("success");
                tracing::debug!(target: "gate.auth.jwt", "Token verified");
            }
            Err(e @ (AuthError::UnexpectedSigningMethod | AuthError::InvalidKeyId)) => {
                metrics::record_token_verification(e.kind());
                tracing::warn!(target: "gate.auth.jwt", kind = e.kind(), "Token rejected");
            }
            Err(e) => {
                metrics::record_token_verification(e.kind());
                tracing::debug!(target: "gate.auth.jwt", kind = e.kind(), "Token rejected");
            }
        }

        result
    }

    async fn verify_inner(&self, token: &str, ctx: &CallContext) -> Result<VerifiedIdentity, AuthError> {
        // 1. Parse the header without trusting it
        let header = decode_header(token).map_err(|e| match e {
            JwtHeaderError::TokenTooLarge | JwtHeaderError::MalformedToken => {
                AuthError::TokenMalformed
            }
        })?;

        // 2. Resolve the key by ID
        let kid = header.kid.as_deref().ok_or(AuthError::InvalidKeyId)?;
        let key = self.jwks_client.get_key(kid, ctx).await?;

        // 3. The token must name exactly the configured algorithm
        let token_alg =
            Algorithm::from_str(&header.alg).map_err(|_| AuthError::UnexpectedSigningMethod)?;
        if token_alg != self.config.algorithm {
            tracing::debug!(
                target: "gate.auth.jwt",
                token_alg = %header.alg,
                expected = ?self.config.algorithm,
                "Signing method mismatch"
            );
            return Err(AuthError::UnexpectedSigningMethod);
        }

        if KeyFamily::for_algorithm(token_alg) != Some(key.family()) {
            tracing::debug!(
                target: "gate.auth.jwt",
                kid = %kid,
                family = ?key.family(),
                "Key family does not match algorithm"
            );
            return Err(AuthError::TokenInvalid);
        }

        // 4-5. Signature, then time and registered claims
        let token_data = decode::<Map<String, Value>>(token, key.decoding_key(), &self.validation)
            .map_err(|e| map_jwt_error(e.kind()))?;

        Ok(VerifiedIdentity::new(
            token_data.claims,
            token_data.header,
            SecretString::from(token.to_string()),
        ))
    }
}

fn map_jwt_error(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::ImmatureSignature => AuthError::TokenNotActive,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::TokenMalformed,
        _ => AuthError::TokenInvalid,
    }
}
