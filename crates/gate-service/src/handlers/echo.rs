//! Protected echo route.
//!
//! Reports what the pipeline attached to the call: the subject, the verified
//! claims and the policy decision.

use crate::context::CallContext;
use crate::policy::PolicyDecision;
use axum::http::{Method, Uri};
use axum::{Extension, Json};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Serialize)]
pub struct EchoResponse {
    pub call_id: String,
    pub method: String,
    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Map<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<PolicyDecision>,
}

/// Handler for GET|POST /api/*
#[tracing::instrument(skip_all, name = "gate.handlers.echo")]
pub async fn echo(Extension(ctx): Extension<CallContext>, method: Method, uri: Uri) -> Json<EchoResponse> {
    let identity = ctx.identity();

    Json(EchoResponse {
        call_id: ctx.call_id().to_string(),
        method: method.to_string(),
        path: uri.path().to_string(),
        subject: identity.and_then(|i| i.subject()).map(str::to_string),
        claims: identity.map(|i| i.claims().clone()),
        decision: ctx.decision().cloned(),
    })
}
