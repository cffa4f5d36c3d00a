//! HTTP middleware.
//!
//! - `auth` runs the stage chain in front of protected routes
//! - `http_metrics` records every response

pub mod auth;
pub mod http_metrics;

pub use auth::{enforce_pipeline, CallContextExt, GateState, HttpRequestInput};
pub use http_metrics::http_metrics_middleware;
