//! Step composition (onion model)
//!
//! An ordered list of steps becomes one handler. Running the handler runs
//! step 1 with a [`Next`] that runs step 2, and so on; the last step gets a
//! `Next` that does nothing.
//!
//! ```text
//!   step 1 ── pre ─┐                         ┌─ post ── step 1
//!   step 2 ── pre ─┤                         ├─ post ── step 2
//!   terminal ───── pre ── (no-op next) ── post ─┘
//! ```
//!
//! A step that never runs `next` short-circuits everything downstream.
//! Errors propagate outwards through every waiting `next`; the engine adds
//! no error handling of its own, so post-actions after a failed `next` only
//! run if the step itself catches the error.

use crate::domain::context::Context;
use crate::error::ProcessingResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// One unit of message-handling logic.
#[async_trait]
pub trait Step: Send + Sync {
    /// Handle the message in `ctx`, running `next` to continue the chain.
    async fn handle(&self, ctx: &Context, next: Next<'_>) -> ProcessingResult<()>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// The remainder of the chain after the current step.
///
/// Consumed by [`run`](Next::run), so each step continues the chain at most once.
#[must_use = "a step that drops `next` without running it short-circuits the chain"]
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Step>],
    ctx: &'a Context,
}

impl<'a> Next<'a> {
    pub(crate) fn new(remaining: &'a [Arc<dyn Step>], ctx: &'a Context) -> Self {
        Self { remaining, ctx }
    }

    /// Run every downstream step and wait for them to finish.
    pub async fn run(self) -> ProcessingResult<()> {
        match self.remaining.split_first() {
            Some((step, rest)) => step.handle(self.ctx, Next::new(rest, self.ctx)).await,
            None => Ok(()),
        }
    }

    /// True when there is nothing downstream.
    pub fn is_last(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Number of steps still to run.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.remaining.len())
            .finish()
    }
}

/// The materialised handler built from the step list.
#[derive(Clone)]
pub struct ComposedStack {
    steps: Arc<[Arc<dyn Step>]>,
}

impl ComposedStack {
    /// Run the whole chain for one context.
    pub async fn run(&self, ctx: &Context) -> ProcessingResult<()> {
        Next::new(&self.steps, ctx).run().await
    }

    /// Number of composed steps, terminal step included.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for ComposedStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedStack")
            .field("steps", &self.step_names())
            .finish()
    }
}

/// Compose an ordered step list into one handler.
pub fn compose(steps: Vec<Arc<dyn Step>>) -> ComposedStack {
    ComposedStack {
        steps: steps.into(),
    }
}

/// Step backed by a closure.
///
/// The closure returns a boxed future borrowing the context and `next`:
///
/// ```rust,ignore
/// app.use_step(step_fn(|ctx, next| async move {
///     tracing::info!(tag = ctx.message().fields.delivery_tag, "received");
///     next.run().await
/// }.boxed()))?;
/// ```
pub struct StepFn<F> {
    f: F,
    name: String,
}

/// Wrap a closure as a [`Step`].
pub fn step_fn<F>(f: F) -> StepFn<F>
where
    F: for<'a> Fn(&'a Context, Next<'a>) -> BoxFuture<'a, ProcessingResult<()>> + Send + Sync,
{
    StepFn {
        f,
        name: "step_fn".to_string(),
    }
}

impl<F> StepFn<F> {
    /// Give the step a name for logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl<F> Step for StepFn<F>
where
    F: for<'a> Fn(&'a Context, Next<'a>) -> BoxFuture<'a, ProcessingResult<()>> + Send + Sync,
{
    async fn handle(&self, ctx: &Context, next: Next<'_>) -> ProcessingResult<()> {
        (self.f)(ctx, next).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
