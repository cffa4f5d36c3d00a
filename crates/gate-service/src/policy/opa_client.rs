//! HTTP client for the remote decision service.
//!
//! Queries are sent as `POST {base}/v1/{query with '.' -> '/'}` with body
//! `{"input": ...}`. Each request gets its own child span and is bounded by
//! the client timeout, the call deadline (whichever is sooner) and the call's
//! cancellation token.

use super::PolicyInput;
use crate::context::CallContext;
use crate::errors::{AuthError, StartupError};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::Instrument;

/// Failure talking to the decision service.
#[derive(Debug, Error)]
pub enum OpaError {
    #[error("decision service unreachable: {0}")]
    Transport(String),

    #[error("decision service returned status {0}")]
    Status(u16),

    #[error("undecodable decision response: {0}")]
    Decode(String),

    #[error("decision request timed out")]
    Timeout,

    #[error("call cancelled")]
    Cancelled,
}

impl From<OpaError> for AuthError {
    fn from(e: OpaError) -> Self {
        AuthError::PolicyEvaluationFailed(e.to_string())
    }
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    input: &'a PolicyInput,
}

/// Client for the decision service data API.
#[derive(Debug, Clone)]
pub struct OpaClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl OpaClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - e.g. "http://localhost:8181"
    /// * `timeout` - upper bound for a single decision request
    ///
    /// # Errors
    ///
    /// Returns `StartupError::Server` if the HTTP client cannot be built.
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, StartupError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                tracing::error!(target: "gate.policy.opa", error = %e, "Failed to build HTTP client");
                StartupError::Server(format!("failed to build decision service client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL a dotted query is posted to.
    pub fn query_url(&self, query: &str) -> String {
        format!("{}/v1/{}", self.base_url, query.replace('.', "/"))
    }

    /// Evaluate `query` against `input` and decode the response body as `T`.
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        input: &PolicyInput,
        ctx: &CallContext,
    ) -> Result<T, OpaError> {
        let span = tracing::info_span!(
            "gate.policy.opa.query",
            query = %query,
            call_id = %ctx.call_id(),
            remote_addr = tracing::field::Empty,
            status = tracing::field::Empty,
        );

        let timeout = match ctx.remaining() {
            Some(remaining) => remaining.min(self.timeout),
            None => self.timeout,
        };

        let request = self.send(query, input, timeout).instrument(span);

        tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => {
                tracing::debug!(target: "gate.policy.opa", query = %query, "Decision request cancelled");
                Err(OpaError::Cancelled)
            }
            result = request => result,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        query: &str,
        input: &PolicyInput,
        timeout: Duration,
    ) -> Result<T, OpaError> {
        let url = self.query_url(query);
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(&QueryRequest { input })
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "gate.policy.opa", error = %e, "Decision request failed");
                if e.is_timeout() {
                    OpaError::Timeout
                } else {
                    OpaError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let span = tracing::Span::current();
        span.record("status", status.as_u16());
        if let Some(addr) = response.remote_addr() {
            span.record("remote_addr", tracing::field::display(addr));
        }
        tracing::debug!(
            target: "gate.policy.opa",
            remote_addr = ?response.remote_addr(),
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Decision service responded"
        );

        if !status.is_success() {
            tracing::warn!(target: "gate.policy.opa", status = status.as_u16(), "Decision service returned error status");
            return Err(OpaError::Status(status.as_u16()));
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                OpaError::Timeout
            } else {
                OpaError::Decode(e.to_string())
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use gate_test_utils::MockOpa;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    fn input() -> PolicyInput {
        PolicyInput::new(json!({"method": "GET"}), json!({"sub": "alice"}).as_object().cloned())
    }

    #[test]
    fn test_query_url() {
        let client = OpaClient::new(
            "http://localhost:8181/".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.query_url("data.authz.allow"),
            "http://localhost:8181/v1/data/authz/allow"
        );
    }

    #[test]
    fn test_opa_error_maps_to_evaluation_failure() {
        let err: AuthError = OpaError::Status(500).into();
        assert!(matches!(err, AuthError::PolicyEvaluationFailed(msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_query_posts_input_envelope() {
        let opa = MockOpa::start().await;
        opa.respond("data.authz.allow", json!({"result": true})).await;
        let client = OpaClient::new(opa.base_url(), Duration::from_secs(5)).unwrap();

        let body: Value = client
            .query("data.authz.allow", &input(), &CallContext::new())
            .await
            .unwrap();

        assert_eq!(body, json!({"result": true}));
        let received = opa.received_bodies().await;
        assert_eq!(
            received,
            vec![json!({"input": {"request": {"method": "GET"}, "claims": {"sub": "alice"}}})]
        );
    }

    #[tokio::test]
    async fn test_query_non_success_status() {
        let opa = MockOpa::start().await;
        opa.respond_raw("data.authz.allow", 500, "boom").await;
        let client = OpaClient::new(opa.base_url(), Duration::from_secs(5)).unwrap();

        let result: Result<Value, _> = client
            .query("data.authz.allow", &input(), &CallContext::new())
            .await;
        assert!(matches!(result, Err(OpaError::Status(500))));
    }

    #[tokio::test]
    async fn test_query_undecodable_body() {
        let opa = MockOpa::start().await;
        opa.respond_raw("data.authz.allow", 200, "not json").await;
        let client = OpaClient::new(opa.base_url(), Duration::from_secs(5)).unwrap();

        let result: Result<Value, _> = client
            .query("data.authz.allow", &input(), &CallContext::new())
            .await;
        assert!(matches!(result, Err(OpaError::Decode(_))));
    }

    #[tokio::test]
    async fn test_query_respects_call_deadline() {
        let opa = MockOpa::start().await;
        opa.respond_delayed(
            "data.authz.allow",
            json!({"result": true}),
            Duration::from_secs(2),
        )
        .await;
        let client = OpaClient::new(opa.base_url(), Duration::from_secs(30)).unwrap();
        let ctx = CallContext::new().with_timeout(Duration::from_millis(100));

        let result: Result<Value, _> = client.query("data.authz.allow", &input(), &ctx).await;
        assert!(matches!(result, Err(OpaError::Timeout)));
    }

    #[tokio::test]
    async fn test_query_honours_cancellation() {
        let opa = MockOpa::start().await;
        opa.respond_delayed(
            "data.authz.allow",
            json!({"result": true}),
            Duration::from_secs(2),
        )
        .await;
        let client = OpaClient::new(opa.base_url(), Duration::from_secs(30)).unwrap();
        let cancel = CancellationToken::new();
        let ctx = CallContext::new().with_cancellation(cancel.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result: Result<Value, _> = client.query("data.authz.allow", &input(), &ctx).await;
        assert!(matches!(result, Err(OpaError::Cancelled)));
    }

    #[tokio::test]
    async fn test_query_unreachable_is_transport_error() {
        let client = OpaClient::new(
            "http://127.0.0.1:9".to_string(),
            Duration::from_secs(2),
        )
        .unwrap();

        let result: Result<Value, _> = client
            .query("data.authz.allow", &input(), &CallContext::new())
            .await;
        assert!(matches!(result, Err(OpaError::Transport(_))));
    }
}
