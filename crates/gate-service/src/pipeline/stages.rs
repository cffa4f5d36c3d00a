//! Built-in pipeline stages.
//!
//! - `AuthenticateStage` verifies the call's bearer token and attaches the identity
//! - `AuthorizeStage` asks a decision point about the call and attaches the decision
//! - `SignStage` mints a token for outbound calls

use super::{Stage, StageKind};
use crate::auth::TokenVerifier;
use crate::context::CallContext;
use crate::errors::AuthError;
use crate::policy::{self, PolicyDecisionPoint, PolicyInput};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Whether a call without a token may pass authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// A missing token fails with `TokenContextMissing`.
    Required,
    /// A missing token passes with no identity attached. A token that is
    /// present is still verified.
    Optional,
}

impl AuthMode {
    pub fn from_optional(optional: bool) -> Self {
        if optional {
            AuthMode::Optional
        } else {
            AuthMode::Required
        }
    }
}

/// Verifies the bearer token carried by the call context.
pub struct AuthenticateStage {
    verifier: Arc<TokenVerifier>,
    mode: AuthMode,
}

impl AuthenticateStage {
    pub fn new(verifier: Arc<TokenVerifier>, mode: AuthMode) -> Self {
        Self { verifier, mode }
    }
}

#[async_trait]
impl<Req: Sync> Stage<Req> for AuthenticateStage {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    fn kind(&self) -> StageKind {
        StageKind::Authentication
    }

    async fn process(&self, ctx: &mut CallContext, _request: &Req) -> Result<(), AuthError> {
        let identity = match ctx.token() {
            Some(token) => self.verifier.verify(token, ctx).await?,
            None if self.mode == AuthMode::Optional => {
                tracing::debug!(target: "gate.pipeline.authn", call_id = %ctx.call_id(), "No token presented, continuing anonymously");
                return Ok(());
            }
            None => {
                tracing::debug!(target: "gate.pipeline.authn", call_id = %ctx.call_id(), "No token presented");
                return Err(AuthError::TokenContextMissing);
            }
        };

        ctx.set_identity(identity);
        Ok(())
    }
}

/// Asks a decision point whether the call may proceed.
///
/// The request is serialized into the policy input's `request` field and the
/// verified claims, if any, into `claims`.
pub struct AuthorizeStage {
    pdp: Arc<dyn PolicyDecisionPoint>,
}

impl AuthorizeStage {
    pub fn new(pdp: Arc<dyn PolicyDecisionPoint>) -> Self {
        Self { pdp }
    }
}

#[async_trait]
impl<Req: Serialize + Sync> Stage<Req> for AuthorizeStage {
    fn name(&self) -> &'static str {
        "authorize"
    }

    fn kind(&self) -> StageKind {
        StageKind::Authorization
    }

    async fn process(&self, ctx: &mut CallContext, request: &Req) -> Result<(), AuthError> {
        let request = serde_json::to_value(request).map_err(|e| {
            AuthError::PolicyEvaluationFailed(format!("request encoding: {}", e))
        })?;
        let input = PolicyInput::for_call(request, ctx);

        let decision = policy::authorize(self.pdp.as_ref(), &input, ctx).await?;
        ctx.set_decision(decision);
        Ok(())
    }
}

/// Signs a fixed claims set and places the token in the call context.
pub struct SignStage {
    kid: String,
    key: EncodingKey,
    algorithm: Algorithm,
    claims: Value,
}

impl SignStage {
    pub fn new(kid: impl Into<String>, key: EncodingKey, algorithm: Algorithm, claims: Value) -> Self {
        Self {
            kid: kid.into(),
            key,
            algorithm,
            claims,
        }
    }
}

#[async_trait]
impl<Req: Sync> Stage<Req> for SignStage {
    fn name(&self) -> &'static str {
        "sign"
    }

    fn kind(&self) -> StageKind {
        StageKind::Other
    }

    async fn process(&self, ctx: &mut CallContext, _request: &Req) -> Result<(), AuthError> {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.kid.clone());

        let token = encode(&header, &self.claims, &self.key).map_err(|e| {
            tracing::error!(target: "gate.pipeline.sign", error = %e, kid = %self.kid, "Token signing failed");
            AuthError::Internal(format!("token signing failed: {}", e))
        })?;

        ctx.set_token(token);
        Ok(())
    }
}
