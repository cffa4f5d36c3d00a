//! Observability for the gate.
//!
//! - `metrics` - Prometheus metric definitions and recorder setup

pub mod metrics;
