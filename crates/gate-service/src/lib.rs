//! Gate Service Library
//!
//! A token-verification and policy-authorization pipeline placed in front of
//! request handlers:
//!
//! - Bearer JWTs are verified against a key set fetched from a JWKS endpoint
//! - Verified claims plus request attributes are evaluated by a policy,
//!   either embedded Rego or a remote decision service
//! - Handlers only run when every pipeline stage passes
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> pipeline (stages) -> handlers/*.rs
//!                                          │          │
//!                                   auth::TokenVerifier  policy::PolicyDecisionPoint
//!                                          │
//!                                   auth::JwksClient <- tasks::jwks_refresher
//! ```
//!
//! # Modules
//!
//! - `auth` - key set client and token verification
//! - `config` - service configuration from environment
//! - `context` - call-scoped context carried through the pipeline
//! - `errors` - error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - pipeline and metrics middleware
//! - `observability` - metrics
//! - `pipeline` - stage composer and built-in stages
//! - `policy` - embedded and remote decision points
//! - `routes` - Axum router setup
//! - `tasks` - background key set refresh

pub mod auth;
pub mod config;
pub mod context;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod routes;
pub mod tasks;
