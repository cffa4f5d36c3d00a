//! Policy decision points.
//!
//! Both decision points take the same `PolicyInput` and return the same
//! `Verdict`, so the authorization stage and its tests do not care where the
//! policy is evaluated.
//!
//! - `embedded` - in-process Rego evaluation
//! - `remote` - decisions from an external decision service over HTTP
//! - `opa_client` - the HTTP client the remote decision point uses

pub mod embedded;
pub mod opa_client;
pub mod remote;

pub use embedded::{CompiledPolicy, EmbeddedPolicy};
pub use opa_client::{OpaClient, OpaError};
pub use remote::{AuthorizationResponse, RemotePolicy};

use crate::config::{Config, PolicyMode};
use crate::context::CallContext;
use crate::errors::{AuthError, StartupError};
use crate::observability::metrics;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Input handed to a policy: the request plus the verified claims, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyInput {
    #[serde(skip_serializing_if = "Value::is_null")]
    pub request: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Map<String, Value>>,
}

impl PolicyInput {
    pub fn new(request: Value, claims: Option<Map<String, Value>>) -> Self {
        Self { request, claims }
    }

    /// Build the input for a call from its request payload and attached identity.
    pub fn for_call(request: Value, ctx: &CallContext) -> Self {
        Self {
            request,
            claims: ctx.identity().map(|identity| identity.claims().clone()),
        }
    }
}

/// An "allow" decision and whatever the policy returned alongside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyDecision {
    pub allowed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Outcome of an evaluation that completed.
///
/// Evaluation faults are not verdicts; decision points report them as
/// `AuthError::PolicyEvaluationFailed`.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Allowed(PolicyDecision),
    Denied,
}

/// A place policy decisions come from.
#[async_trait]
pub trait PolicyDecisionPoint: Send + Sync {
    fn mode(&self) -> PolicyMode;

    /// Evaluate the policy for one call.
    async fn decide(&self, input: &PolicyInput, ctx: &CallContext) -> Result<Verdict, AuthError>;
}

/// Ask `pdp` for a decision and fold a denial into `AuthError::DeniedByPolicy`.
pub async fn authorize(
    pdp: &dyn PolicyDecisionPoint,
    input: &PolicyInput,
    ctx: &CallContext,
) -> Result<PolicyDecision, AuthError> {
    let start = Instant::now();
    let result = pdp.decide(input, ctx).await;
    let elapsed = start.elapsed();

    let outcome = match &result {
        Ok(Verdict::Allowed(_)) => "allowed",
        Ok(Verdict::Denied) => "denied",
        Err(_) => "error",
    };
    metrics::record_policy_decision(pdp.mode(), outcome, elapsed);
    tracing::debug!(
        target: "gate.policy",
        mode = %pdp.mode(),
        outcome,
        elapsed_ms = elapsed.as_millis() as u64,
        "Policy decision"
    );

    match result? {
        Verdict::Allowed(decision) => Ok(decision),
        Verdict::Denied => Err(AuthError::DeniedByPolicy),
    }
}

/// Build the configured decision point.
///
/// # Errors
///
/// Returns `StartupError` if the policy file cannot be read or compiled, or
/// the decision service client cannot be built.
pub fn from_config(config: &Config) -> Result<Arc<dyn PolicyDecisionPoint>, StartupError> {
    match config.policy_mode {
        PolicyMode::Embedded => {
            let path = config
                .policy_file
                .clone()
                .ok_or_else(|| StartupError::PolicyFile {
                    path: String::new(),
                    reason: "POLICY_FILE is not set".to_string(),
                })?;
            let source =
                std::fs::read_to_string(&path).map_err(|e| StartupError::PolicyFile {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            let policy = CompiledPolicy::compile(&path, &source, &config.policy_query)?;
            tracing::info!(target: "gate.policy", path = %path, query = %config.policy_query, "Embedded policy compiled");
            Ok(Arc::new(EmbeddedPolicy::new(Arc::new(policy))))
        }
        PolicyMode::Remote => {
            let client = OpaClient::new(
                config.opa_base_url(),
                Duration::from_millis(config.opa_timeout_ms),
            )?;
            tracing::info!(target: "gate.policy", base_url = %client.base_url(), query = %config.policy_query, "Using remote decision service");
            Ok(Arc::new(RemotePolicy::new(
                Arc::new(client),
                config.policy_query.clone(),
            )))
        }
    }
}
