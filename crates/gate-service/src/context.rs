//! Call-scoped context threaded through pipeline stages.
//!
//! A `CallContext` is created per inbound call and owned by that call. It
//! carries the raw bearer token, the verified identity, the last policy
//! decision, and the call's deadline and cancellation token. Only pipeline
//! stages in this crate may attach identity or decisions.

use crate::auth::claims::VerifiedIdentity;
use crate::policy::PolicyDecision;
use common::secret::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Clone)]
pub struct CallContext {
    call_id: Uuid,
    token: Option<SecretString>,
    identity: Option<VerifiedIdentity>,
    decision: Option<PolicyDecision>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            call_id: Uuid::new_v4(),
            token: None,
            identity: None,
            decision: None,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach the bearer token presented by the caller.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// The raw bearer token, if one was presented or signed for this call.
    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret())
    }

    pub fn identity(&self) -> Option<&VerifiedIdentity> {
        self.identity.as_ref()
    }

    /// The decision attached by the last successful authorization stage.
    pub fn decision(&self) -> Option<&PolicyDecision> {
        self.decision.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` means no deadline was set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn set_token(&mut self, token: String) {
        self.token = Some(SecretString::from(token));
    }

    pub(crate) fn set_identity(&mut self, identity: VerifiedIdentity) {
        self.identity = Some(identity);
    }

    pub(crate) fn set_decision(&mut self, decision: PolicyDecision) {
        self.decision = Some(decision);
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("call_id", &self.call_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("identity", &self.identity)
            .field("decision", &self.decision)
            .field("deadline", &self.deadline)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
