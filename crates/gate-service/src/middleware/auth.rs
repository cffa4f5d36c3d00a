//! Pipeline middleware for protected routes.
//!
//! Extracts the bearer token, builds the call context, runs the configured
//! stage chain and, if every stage passes, hands the context to the route
//! handler through request extensions.

use crate::context::CallContext;
use crate::errors::AuthError;
use crate::pipeline::StageChain;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// What a policy sees of an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpRequestInput {
    pub method: String,
    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl HttpRequestInput {
    pub fn from_request(req: &Request) -> Self {
        Self {
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            query: req.uri().query().map(str::to_string),
        }
    }
}

/// State for the pipeline middleware.
#[derive(Clone)]
pub struct GateState {
    /// Validated stage chain run for every protected request.
    pub chain: StageChain<HttpRequestInput>,

    /// Deadline applied to each call context.
    pub request_timeout: Duration,
}

/// Extract a Bearer token from the Authorization header.
///
/// An absent header, or one with a different scheme, yields `None`. The
/// scheme is matched case-insensitively.
fn extract_bearer_token(req: &Request) -> Result<Option<&str>, AuthError> {
    let Some(value) = req.headers().get(AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value.to_str().map_err(|_| {
        tracing::debug!(target: "gate.middleware.auth", "Authorization header is not valid ASCII");
        AuthError::TokenMalformed
    })?;

    let Some((scheme, token)) = value.split_once(' ') else {
        return Ok(None);
    };
    if !scheme.eq_ignore_ascii_case("bearer") {
        tracing::debug!(target: "gate.middleware.auth", "Authorization header is not a Bearer credential");
        return Ok(None);
    }

    let token = token.trim();
    if token.is_empty() {
        tracing::debug!(target: "gate.middleware.auth", "Empty Bearer credential");
        return Err(AuthError::TokenMalformed);
    }

    Ok(Some(token))
}

/// Run the stage chain in front of a protected route.
///
/// # Response
///
/// - Returns the first stage's error response if any stage fails
/// - Continues to the handler with the `CallContext` in extensions otherwise
#[instrument(skip_all, name = "gate.middleware.pipeline", fields(method = %req.method(), path = %req.uri().path()))]
pub async fn enforce_pipeline(
    State(state): State<Arc<GateState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let mut ctx = CallContext::new().with_timeout(state.request_timeout);
    if let Some(token) = extract_bearer_token(&req)? {
        ctx = ctx.with_token(token);
    }

    let input = HttpRequestInput::from_request(&req);
    state.chain.run(&mut ctx, &input).await?;

    tracing::debug!(
        target: "gate.middleware.auth",
        call_id = %ctx.call_id(),
        authenticated = ctx.identity().is_some(),
        "Pipeline passed"
    );

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Extension trait for reading the call context from a request.
pub trait CallContextExt {
    /// Returns `None` if the pipeline middleware was not applied.
    fn call_context(&self) -> Option<&CallContext>;
}

impl<B> CallContextExt for axum::extract::Request<B> {
    fn call_context(&self) -> Option<&CallContext> {
        self.extensions().get::<CallContext>()
    }
}
