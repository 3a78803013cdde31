//! Domain module for the consumer
//!
//! ## Core Modules
//! - compose: Step trait, `Next` continuation, onion composition
//! - context: per-message context and error reporting
//! - hooks: lifecycle hook registry
//! - lifecycle: connect/close state machine
//!
//! ## Supporting
//! - config: validated application configuration
//! - message: inbound delivery shape
//! - url: broker URL builder

pub mod compose;
pub mod config;
pub mod context;
pub mod hooks;
pub mod lifecycle;
pub mod message;
pub mod url;

// Core exports
pub use compose::{compose, step_fn, ComposedStack, Next, Step, StepFn};
pub use context::{AppHandle, Context, ContextSnapshot};
pub use hooks::{hook_fn, Hook, HookFn, HookPhase, HookRegistry, LifecycleEvent};
pub use lifecycle::LifecycleState;

// Supporting exports
pub use config::{AppConfig, AppConfigBuilder, BrokerEndpoint};
pub use message::{Delivery, DeliveryFields, MessageProperties};
pub use url::{build_url, build_url_with_rng, Hosts, BROKER_SCHEME};
