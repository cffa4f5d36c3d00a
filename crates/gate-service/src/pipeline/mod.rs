//! Pipeline composer.
//!
//! A pipeline is an ordered list of stages wrapped around a terminal handler.
//! Stages run in configured order; the first failing stage ends the call and
//! neither later stages nor the handler run. Authorization stages may only
//! appear after an authentication stage; `PipelineBuilder` rejects any other
//! configuration.
//!
//! ```text
//! CallContext ─> stage[0] ─> stage[1] ─> ... ─> handler
//!                   │           │
//!                   └─ Err ─────┴──────────────> AuthError (handler never runs)
//! ```

pub mod stages;

pub use stages::{AuthMode, AuthenticateStage, AuthorizeStage, SignStage};

use crate::context::CallContext;
use crate::errors::AuthError;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// What a stage does, for ordering checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Authentication,
    Authorization,
    Other,
}

/// One step of a pipeline.
#[async_trait]
pub trait Stage<Req: Sync>: Send + Sync {
    /// Short name used in logs and configuration errors.
    fn name(&self) -> &'static str;

    fn kind(&self) -> StageKind;

    /// Run the stage. Returning an error ends the call.
    async fn process(&self, ctx: &mut CallContext, request: &Req) -> Result<(), AuthError>;
}

/// The terminal handler a pipeline wraps.
#[async_trait]
pub trait Handler<Req, Resp>: Send + Sync {
    async fn call(&self, ctx: CallContext, request: Req) -> Result<Resp, AuthError>;
}

#[async_trait]
impl<F, Fut, Req, Resp> Handler<Req, Resp> for F
where
    F: Fn(CallContext, Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp, AuthError>> + Send,
    Req: Send + 'static,
    Resp: 'static,
{
    async fn call(&self, ctx: CallContext, request: Req) -> Result<Resp, AuthError> {
        (self)(ctx, request).await
    }
}

/// Per-call pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    RunningStage(usize),
    HandlerExecuting,
    Failed,
    Completed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::RunningStage(i) => write!(f, "running-stage[{}]", i),
            PipelineState::HandlerExecuting => f.write_str("handler-executing"),
            PipelineState::Failed => f.write_str("failed"),
            PipelineState::Completed => f.write_str("completed"),
        }
    }
}

fn transition(ctx: &CallContext, state: PipelineState) {
    tracing::trace!(
        target: "gate.pipeline",
        call_id = %ctx.call_id(),
        state = %state,
        "Pipeline state"
    );
}

/// Invalid pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("authorization stage '{name}' at position {index} is not preceded by an authentication stage")]
    AuthorizationBeforeAuthentication { index: usize, name: &'static str },
}

/// A validated, ordered list of stages.
pub struct StageChain<Req: Sync> {
    stages: Vec<Arc<dyn Stage<Req>>>,
}

impl<Req: Sync> Clone for StageChain<Req> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<Req: Sync> StageChain<Req> {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order, stopping at the first failure.
    ///
    /// On success the context carries whatever the stages attached.
    pub async fn run(&self, ctx: &mut CallContext, request: &Req) -> Result<(), AuthError> {
        for (index, stage) in self.stages.iter().enumerate() {
            transition(ctx, PipelineState::RunningStage(index));
            if let Err(e) = stage.process(ctx, request).await {
                transition(ctx, PipelineState::Failed);
                tracing::debug!(
                    target: "gate.pipeline",
                    call_id = %ctx.call_id(),
                    stage = stage.name(),
                    kind = e.kind(),
                    "Stage failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Stages plus the handler they guard.
pub struct Pipeline<Req: Sync, Resp> {
    chain: StageChain<Req>,
    handler: Arc<dyn Handler<Req, Resp>>,
}

impl<Req: Sync, Resp> Clone for Pipeline<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<Req: Sync, Resp> Pipeline<Req, Resp> {
    pub fn chain(&self) -> &StageChain<Req> {
        &self.chain
    }

    /// Run the stages, then the handler if they all passed.
    pub async fn call(&self, mut ctx: CallContext, request: Req) -> Result<Resp, AuthError> {
        self.chain.run(&mut ctx, &request).await?;

        transition(&ctx, PipelineState::HandlerExecuting);
        let call_id = ctx.call_id();
        match self.handler.call(ctx, request).await {
            Ok(response) => {
                tracing::trace!(target: "gate.pipeline", call_id = %call_id, state = %PipelineState::Completed, "Pipeline state");
                Ok(response)
            }
            Err(e) => {
                tracing::trace!(target: "gate.pipeline", call_id = %call_id, state = %PipelineState::Failed, "Pipeline state");
                Err(e)
            }
        }
    }
}

/// Builder enforcing "authenticate before authorize".
pub struct PipelineBuilder<Req: Sync> {
    stages: Vec<Arc<dyn Stage<Req>>>,
}

impl<Req: Sync> Default for PipelineBuilder<Req> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req: Sync> PipelineBuilder<Req> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage.
    #[must_use]
    pub fn stage<S: Stage<Req> + 'static>(self, stage: S) -> Self {
        self.shared_stage(Arc::new(stage))
    }

    /// Append a stage that is shared with other pipelines.
    #[must_use]
    pub fn shared_stage(mut self, stage: Arc<dyn Stage<Req>>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validate the stage order and return the chain without a handler.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::AuthorizationBeforeAuthentication` if any
    /// authorization stage is not preceded by an authentication stage.
    pub fn build_chain(self) -> Result<StageChain<Req>, PipelineError> {
        let mut authenticated = false;
        for (index, stage) in self.stages.iter().enumerate() {
            match stage.kind() {
                StageKind::Authentication => authenticated = true,
                StageKind::Authorization if !authenticated => {
                    return Err(PipelineError::AuthorizationBeforeAuthentication {
                        index,
                        name: stage.name(),
                    });
                }
                StageKind::Authorization | StageKind::Other => {}
            }
        }

        Ok(StageChain {
            stages: self.stages,
        })
    }

    /// Validate the stage order and wrap `handler`.
    ///
    /// # Errors
    ///
    /// See [`PipelineBuilder::build_chain`].
    pub fn handler<Resp, H>(self, handler: H) -> Result<Pipeline<Req, Resp>, PipelineError>
    where
        H: Handler<Req, Resp> + 'static,
    {
        Ok(Pipeline {
            chain: self.build_chain()?,
            handler: Arc::new(handler),
        })
    }
}
