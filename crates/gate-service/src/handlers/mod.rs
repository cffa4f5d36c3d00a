//! HTTP request handlers.
//!
//! - `health` - liveness and readiness probes
//! - `metrics` - Prometheus scrape endpoint
//! - `echo` - protected route reporting what the pipeline established

pub mod echo;
pub mod health;
pub mod metrics;

pub use echo::{echo, EchoResponse};
pub use health::{health_check, readiness_check, ReadinessResponse};
pub use metrics::metrics_handler;
