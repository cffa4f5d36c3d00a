//! JWT utilities shared across the gate workspace.
//!
//! This module provides the untrusted pre-verification helpers:
//! - Size limits for DoS prevention
//! - Leeway constants for `exp`/`nbf` validation
//! - JOSE header decoding (algorithm and key ID) without signature checks
//! - Public key material helpers for JWKS entries (`x`, `x5c`)
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing returned by [`decode_header`] is trusted; it only selects the
//!   key and algorithm that the signature check is then held to
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_header, MAX_JWT_SIZE_BYTES};
//!
//! let header = decode_header(token)?;
//! let kid = header.kid.as_deref();
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this size are rejected BEFORE any parsing or cryptographic
/// operations.
///
/// - Typical JWTs are 200-1500 bytes (header + claims + RSA signature)
/// - Checked BEFORE base64 decode and signature verification
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default leeway applied to `exp` and `nbf` checks.
///
/// Zero: a token whose `exp` is strictly in the past is expired.
pub const DEFAULT_LEEWAY: Duration = Duration::ZERO;

/// Maximum configurable leeway (10 minutes).
///
/// Prevents misconfiguration from turning expiry checks into a no-op.
pub const MAX_LEEWAY: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while decoding an untrusted JWT header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtHeaderError {
    /// Token size exceeds maximum allowed.
    #[error("JWT exceeds {MAX_JWT_SIZE_BYTES} bytes")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("JWT is malformed")]
    MalformedToken,
}

// =============================================================================
// Header Types
// =============================================================================

/// The JOSE header fields needed before verification.
///
/// `alg` is kept as the raw string so unknown or hostile values (`none`,
/// `HS256` against an RSA key set) can be reported distinctly from
/// structurally broken tokens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm named by the token.
    pub alg: String,

    /// Key ID used to select the verification key. Empty values are `None`.
    #[serde(default)]
    pub kid: Option<String>,

    /// Token type (usually "JWT").
    #[serde(default)]
    pub typ: Option<String>,
}

// =============================================================================
// Functions
// =============================================================================

/// Decode the JOSE header of a JWT without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing (denial-of-service prevention)
/// - The returned header is untrusted input
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Not three segments, bad base64url, or header is not
///   a JSON object with a string `alg`
pub fn decode_header(token: &str) -> Result<TokenHeader, JwtHeaderError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtHeaderError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtHeaderError::MalformedToken);
    }

    let header_part = parts.first().ok_or(JwtHeaderError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtHeaderError::MalformedToken
    })?;

    let mut header: TokenHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtHeaderError::MalformedToken
    })?;

    if header.kid.as_deref().is_some_and(str::is_empty) {
        header.kid = None;
    }

    Ok(header)
}

/// Wrap the first `x5c` entry of a JWK in PEM certificate armour.
///
/// `x5c` entries are standard (not url-safe) base64 DER certificates.
#[must_use]
pub fn certificate_pem(x5c_entry: &str) -> String {
    format!("-----BEGIN CERTIFICATE-----\n{x5c_entry}\n-----END CERTIFICATE-----")
}

/// Decode an Ed25519 public key from JWK `x` field (base64url format).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the base64url content cannot be decoded.
///
/// # Example
///
/// ```rust,ignore
/// let bytes = decode_ed25519_public_key_jwk(x)?;
/// let decoding_key = DecodingKey::from_ed_der(&bytes);
/// ```
pub fn decode_ed25519_public_key_jwk(x_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(x_b64url)
}

// =============================================================================
// Tests
// =============================================================================
