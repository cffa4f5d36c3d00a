//! In-process Rego evaluation.
//!
//! A `CompiledPolicy` owns a prepared engine holding the parsed policy
//! module. Each evaluation works on a clone of that engine, so concurrent
//! calls never share input state and the prepared engine is never mutated
//! after construction.

use super::{PolicyDecision, PolicyDecisionPoint, PolicyInput, Verdict};
use crate::config::PolicyMode;
use crate::context::CallContext;
use crate::errors::{AuthError, StartupError};
use async_trait::async_trait;
use regorus::{Engine, QueryResults, Value as RegoValue};
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// A parsed Rego module plus the query to evaluate against it.
pub struct CompiledPolicy {
    engine: Mutex<Engine>,
    query: String,
}

impl CompiledPolicy {
    /// Parse `source` and check that `query` evaluates.
    ///
    /// `path` only labels the module in parse errors.
    ///
    /// # Errors
    ///
    /// Returns `StartupError::PolicyCompile` if the module does not parse or a
    /// trial evaluation of the query against an empty input fails.
    pub fn compile(path: &str, source: &str, query: &str) -> Result<Self, StartupError> {
        let mut engine = Engine::new();
        engine
            .add_policy(path.to_string(), source.to_string())
            .map_err(|e| StartupError::PolicyCompile(format!("{}: {}", path, e)))?;

        let mut trial = engine.clone();
        trial.set_input(RegoValue::new_object());
        trial
            .eval_query(query.to_string(), false)
            .map_err(|e| StartupError::PolicyCompile(format!("query '{}': {}", query, e)))?;

        Ok(Self {
            engine: Mutex::new(engine),
            query: query.to_string(),
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Evaluate the query against `input`.
    pub fn evaluate(&self, input: &PolicyInput) -> Result<Verdict, AuthError> {
        let mut engine = self
            .engine
            .lock()
            .map_err(|_| AuthError::PolicyEvaluationFailed("policy engine lock poisoned".to_string()))?
            .clone();

        let input_json = serde_json::to_string(input)
            .map_err(|e| AuthError::PolicyEvaluationFailed(format!("input encoding: {}", e)))?;
        let input_value = RegoValue::from_json_str(&input_json)
            .map_err(|e| AuthError::PolicyEvaluationFailed(format!("input conversion: {}", e)))?;
        engine.set_input(input_value);

        let results = engine
            .eval_query(self.query.clone(), false)
            .map_err(|e| AuthError::PolicyEvaluationFailed(e.to_string()))?;

        interpret(&results)
    }
}

/// Allowed iff the query produced exactly one boolean `true`.
///
/// No result or an undefined value is a denial; any non-boolean value is an
/// evaluation failure.
fn interpret(results: &QueryResults) -> Result<Verdict, AuthError> {
    let value = match results.result.as_slice() {
        [] => return Ok(Verdict::Denied),
        [single] => match single.expressions.as_slice() {
            [expression] => &expression.value,
            other => {
                return Err(AuthError::PolicyEvaluationFailed(format!(
                    "query produced {} expressions",
                    other.len()
                )))
            }
        },
        many => {
            return Err(AuthError::PolicyEvaluationFailed(format!(
                "query produced {} results",
                many.len()
            )))
        }
    };

    match value {
        RegoValue::Bool(true) => Ok(Verdict::Allowed(PolicyDecision {
            allowed: true,
            result: serde_json::to_value(results).ok(),
        })),
        RegoValue::Bool(false) | RegoValue::Undefined => Ok(Verdict::Denied),
        other => Err(AuthError::PolicyEvaluationFailed(format!(
            "query result is not a boolean: {:?}",
            other
        ))),
    }
}

/// Decision point evaluating a `CompiledPolicy` in-process.
pub struct EmbeddedPolicy {
    policy: Arc<CompiledPolicy>,
}

impl EmbeddedPolicy {
    pub fn new(policy: Arc<CompiledPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl PolicyDecisionPoint for EmbeddedPolicy {
    fn mode(&self) -> PolicyMode {
        PolicyMode::Embedded
    }

    #[instrument(skip_all, name = "gate.policy.embedded", fields(query = %self.policy.query()))]
    async fn decide(&self, input: &PolicyInput, ctx: &CallContext) -> Result<Verdict, AuthError> {
        if ctx.is_cancelled() {
            return Err(AuthError::PolicyEvaluationFailed(
                "call cancelled".to_string(),
            ));
        }
        self.policy.evaluate(input)
    }
}
