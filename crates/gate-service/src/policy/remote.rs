//! Decision point backed by the remote decision service.

use super::{OpaClient, PolicyDecision, PolicyDecisionPoint, PolicyInput, Verdict};
use crate::config::PolicyMode;
use crate::context::CallContext;
use crate::errors::AuthError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

/// Response shape of a decision query.
///
/// An absent `result` means the rule was undefined for this input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<String>,
}

impl AuthorizationResponse {
    /// Interpret `result` as a verdict.
    ///
    /// Missing or `false` is a denial; `true` allows; anything else means the
    /// query was not a boolean decision and is an evaluation failure.
    pub fn into_verdict(self) -> Result<Verdict, AuthError> {
        match &self.result {
            Some(Value::Bool(true)) => {
                let result = serde_json::to_value(&self).ok();
                Ok(Verdict::Allowed(PolicyDecision {
                    allowed: true,
                    result,
                }))
            }
            Some(Value::Bool(false)) | None => Ok(Verdict::Denied),
            Some(other) => Err(AuthError::PolicyEvaluationFailed(format!(
                "decision result is not a boolean: {}",
                other
            ))),
        }
    }
}

/// Decision point that asks the remote decision service.
pub struct RemotePolicy {
    client: Arc<OpaClient>,
    query: String,
}

impl RemotePolicy {
    pub fn new(client: Arc<OpaClient>, query: String) -> Self {
        Self { client, query }
    }
}

#[async_trait]
impl PolicyDecisionPoint for RemotePolicy {
    fn mode(&self) -> PolicyMode {
        PolicyMode::Remote
    }

    #[instrument(skip_all, name = "gate.policy.remote", fields(query = %self.query))]
    async fn decide(&self, input: &PolicyInput, ctx: &CallContext) -> Result<Verdict, AuthError> {
        let response: AuthorizationResponse = self.client.query(&self.query, input, ctx).await?;
        response.into_verdict()
    }
}
