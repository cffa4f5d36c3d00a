//! HTTP routes for the gate.
//!
//! Defines the Axum router, the application state and the stage chain that
//! guards protected routes.

use crate::auth::{JwksClient, TokenVerifier, VerifierConfig};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{enforce_pipeline, http_metrics_middleware, GateState, HttpRequestInput};
use crate::pipeline::{AuthMode, AuthenticateStage, AuthorizeStage, PipelineBuilder, PipelineError, StageChain};
use crate::policy::PolicyDecisionPoint;
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Key set client, shared with the refresher task.
    pub jwks_client: Arc<JwksClient>,

    /// The configured decision point.
    pub pdp: Arc<dyn PolicyDecisionPoint>,
}

/// Build the authenticate -> authorize chain for HTTP calls.
///
/// # Errors
///
/// Returns `PipelineError` if the stage order is invalid.
pub fn build_chain(state: &AppState) -> Result<StageChain<HttpRequestInput>, PipelineError> {
    let verifier = Arc::new(TokenVerifier::new(
        Arc::clone(&state.jwks_client),
        VerifierConfig::from_config(&state.config),
    ));

    PipelineBuilder::<HttpRequestInput>::new()
        .stage(AuthenticateStage::new(
            verifier,
            AuthMode::from_optional(state.config.auth_optional),
        ))
        .stage(AuthorizeStage::new(Arc::clone(&state.pdp)))
        .build_chain()
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - liveness probe, public
/// - `/ready` - readiness probe (non-empty key set), public
/// - `/metrics` - Prometheus metrics, public
/// - `/api/*` - echo route behind the stage chain
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - request timeout from `REQUEST_TIMEOUT_SECONDS`, also used as the call deadline
///
/// # Errors
///
/// Returns `PipelineError` if the stage chain cannot be built.
pub fn build_routes(
    state: Arc<AppState>,
    metrics_handle: PrometheusHandle,
) -> Result<Router, PipelineError> {
    let request_timeout = state.config.request_timeout();
    let gate_state = Arc::new(GateState {
        chain: build_chain(&state)?,
        request_timeout,
    });

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route("/api/*path", get(handlers::echo).post(handlers::echo))
        .route_layer(middleware::from_fn_with_state(gate_state, enforce_pipeline));

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. TraceLayer
    // 3. http_metrics_middleware (outermost, sees every response)
    Ok(public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_gate_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GateState>();
    }
}
