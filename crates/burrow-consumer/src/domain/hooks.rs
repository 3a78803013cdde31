//! Lifecycle hooks
//!
//! At most one before-hook and one after-hook per lifecycle event. The event
//! set is closed: `connect` and `close`. Registering again for the same
//! event and phase replaces the previous hook; hooks never accumulate.

use crate::error::{BoxError, UsageError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Lifecycle operations that accept hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Connect,
    Close,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Connect => "connect",
            LifecycleEvent::Close => "close",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connect" => Ok(LifecycleEvent::Connect),
            "close" => Ok(LifecycleEvent::Close),
            other => Err(UsageError::UnsupportedHookEvent {
                event: other.to_string(),
            }),
        }
    }
}

/// Which side of the lifecycle operation a hook runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookPhase {
    Before,
    After,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Before => f.write_str("before"),
            HookPhase::After => f.write_str("after"),
        }
    }
}

/// A nullary async callback run around `connect()` / `close()`.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn run(&self) -> Result<(), BoxError>;
}

/// Hook backed by a closure returning a future.
pub struct HookFn<F> {
    f: F,
}

/// Wrap a closure as a [`Hook`].
pub fn hook_fn<F, Fut>(f: F) -> HookFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    HookFn { f }
}

#[async_trait]
impl<F, Fut> Hook for HookFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    async fn run(&self) -> Result<(), BoxError> {
        (self.f)().await
    }
}

/// Before/after hooks keyed by lifecycle event.
#[derive(Default, Clone)]
pub struct HookRegistry {
    before: HashMap<LifecycleEvent, Arc<dyn Hook>>,
    after: HashMap<LifecycleEvent, Arc<dyn Hook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `hook`, replacing any hook already registered for the slot.
    pub fn register(&mut self, event: LifecycleEvent, phase: HookPhase, hook: Arc<dyn Hook>) {
        let slot = match phase {
            HookPhase::Before => &mut self.before,
            HookPhase::After => &mut self.after,
        };
        if slot.insert(event, hook).is_some() {
            debug!(%event, %phase, "Replacing previously registered hook");
        } else {
            debug!(%event, %phase, "Hook registered");
        }
    }

    /// Hook registered for the slot, if any.
    pub fn get(&self, event: LifecycleEvent, phase: HookPhase) -> Option<Arc<dyn Hook>> {
        let slot = match phase {
            HookPhase::Before => &self.before,
            HookPhase::After => &self.after,
        };
        slot.get(&event).cloned()
    }

    /// Total number of registered hooks across both phases.
    pub fn len(&self) -> usize {
        self.before.len() + self.after.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("before", &self.before.keys().collect::<Vec<_>>())
            .field("after", &self.after.keys().collect::<Vec<_>>())
            .finish()
    }
}
