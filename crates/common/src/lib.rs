//! Common utilities shared across the gate workspace.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for untrusted JWT header decoding and key material helpers
pub mod jwt;
