//! Background tasks.

pub mod jwks_refresher;

pub use jwks_refresher::start_jwks_refresher;
