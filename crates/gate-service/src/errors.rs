//! Gate error types.
//!
//! `AuthError` is the per-call outcome taxonomy: every pipeline stage fails
//! with exactly one of these kinds and the kind is never rewritten on its way
//! to the transport boundary. `StartupError` covers construction-time
//! failures that must stop the process from serving protected routes.

use crate::config::ConfigError;
use crate::pipeline::PipelineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Per-call pipeline error.
///
/// Maps to HTTP status codes:
/// - DeniedByPolicy: 401 Unauthorized
/// - NotFound: 404 Not Found
/// - everything else, verification kinds included: 500 Internal Server Error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No credential was presented for verification.
    #[error("JWT not present")]
    TokenContextMissing,

    /// The credential is not a structurally valid JWT.
    #[error("JWT is malformed")]
    TokenMalformed,

    /// Signature or claim validation failed.
    #[error("JWT was invalid")]
    TokenInvalid,

    /// The `exp` claim is in the past.
    #[error("JWT is expired")]
    TokenExpired,

    /// The `nbf` claim is in the future.
    #[error("token is not valid yet")]
    TokenNotActive,

    /// The token names an algorithm other than the configured one.
    #[error("unexpected signing method")]
    UnexpectedSigningMethod,

    /// The token's key ID is absent from the trusted key set.
    #[error("invalid key id")]
    InvalidKeyId,

    /// The decision engine could not produce a verdict.
    #[error("policy evaluation failed: {0}")]
    PolicyEvaluationFailed(String),

    /// The decision engine produced a verdict and it was "no".
    #[error("denied by policy")]
    DeniedByPolicy,

    /// Raised by handlers; included so the boundary maps it to 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other handler or stage fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code for this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::TokenContextMissing => "token_context_missing",
            AuthError::TokenMalformed => "token_malformed",
            AuthError::TokenInvalid => "token_invalid",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotActive => "token_not_active",
            AuthError::UnexpectedSigningMethod => "unexpected_signing_method",
            AuthError::InvalidKeyId => "invalid_key_id",
            AuthError::PolicyEvaluationFailed(_) => "policy_evaluation_failed",
            AuthError::DeniedByPolicy => "denied_by_policy",
            AuthError::NotFound(_) => "not_found",
            AuthError::Internal(_) => "internal",
        }
    }

    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::DeniedByPolicy => 401,
            AuthError::NotFound(_) => 404,
            _ => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::DeniedByPolicy => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AuthError::PolicyEvaluationFailed(reason) => {
                // Log actual reason server-side, return generic message to client
                tracing::error!(target: "gate.errors", reason = %reason, "Policy evaluation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "policy evaluation failed".to_string(),
                )
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.kind().to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"gate\", error=\"insufficient_scope\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

/// Construction-time failure. The process must not start serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to fetch key set from {url}: {reason}")]
    KeySetFetch { url: String, reason: String },

    #[error("failed to read policy file {path}: {reason}")]
    PolicyFile { path: String, reason: String },

    #[error("failed to prepare authorization policy: {0}")]
    PolicyCompile(String),

    #[error("invalid pipeline: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("server error: {0}")]
    Server(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(AuthError::TokenContextMissing.to_string(), "JWT not present");
        assert_eq!(AuthError::TokenExpired.to_string(), "JWT is expired");
        assert_eq!(
            AuthError::TokenNotActive.to_string(),
            "token is not valid yet"
        );
        assert_eq!(AuthError::DeniedByPolicy.to_string(), "denied by policy");
        assert_eq!(
            AuthError::PolicyEvaluationFailed("boom".to_string()).to_string(),
            "policy evaluation failed: boom"
        );
    }

    #[test]
    fn test_kinds_are_distinct() {
        let all = [
            AuthError::TokenContextMissing,
            AuthError::TokenMalformed,
            AuthError::TokenInvalid,
            AuthError::TokenExpired,
            AuthError::TokenNotActive,
            AuthError::UnexpectedSigningMethod,
            AuthError::InvalidKeyId,
            AuthError::PolicyEvaluationFailed(String::new()),
            AuthError::DeniedByPolicy,
            AuthError::NotFound(String::new()),
            AuthError::Internal(String::new()),
        ];
        let kinds: std::collections::HashSet<_> = all.iter().map(AuthError::kind).collect();
        assert_eq!(kinds.len(), all.len());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::DeniedByPolicy.status_code(), 401);
        for kind in [
            AuthError::TokenContextMissing,
            AuthError::TokenMalformed,
            AuthError::TokenInvalid,
            AuthError::TokenExpired,
            AuthError::TokenNotActive,
            AuthError::UnexpectedSigningMethod,
            AuthError::InvalidKeyId,
        ] {
            assert_eq!(kind.status_code(), 500, "{}", kind.kind());
            assert_eq!(
                kind.clone().into_response().status(),
                StatusCode::INTERNAL_SERVER_ERROR,
                "{}",
                kind.kind()
            );
        }
        assert_eq!(AuthError::NotFound("x".to_string()).status_code(), 404);
        assert_eq!(
            AuthError::PolicyEvaluationFailed("x".to_string()).status_code(),
            500
        );
        assert_eq!(AuthError::Internal("x".to_string()).status_code(), 500);
    }

    #[tokio::test]
    async fn test_into_response_denied_by_policy() {
        let response = AuthError::DeniedByPolicy.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let www_auth = response.headers().get("WWW-Authenticate").unwrap();
        assert!(www_auth.to_str().unwrap().contains("insufficient_scope"));

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "denied_by_policy");
    }

    #[tokio::test]
    async fn test_into_response_expired_token() {
        let response = AuthError::TokenExpired.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get("WWW-Authenticate").is_none());

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "token_expired");
        assert_eq!(body_json["error"]["message"], "JWT is expired");
    }

    #[tokio::test]
    async fn test_into_response_not_found() {
        let response = AuthError::NotFound("record".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_into_response_evaluation_failure_hides_reason() {
        let response =
            AuthError::PolicyEvaluationFailed("connection refused".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "policy_evaluation_failed");
        assert_eq!(body_json["error"]["message"], "policy evaluation failed");
    }

    #[tokio::test]
    async fn test_into_response_internal_carries_message() {
        let response = AuthError::Internal("handler exploded".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get("WWW-Authenticate").is_none());
        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(
            body_json["error"]["message"],
            "internal error: handler exploded"
        );
    }
}
