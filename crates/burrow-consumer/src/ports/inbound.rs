//! Driving Ports (API - Inbound)
//!
//! What a host drives once the application is assembled.

use crate::domain::lifecycle::LifecycleState;
use crate::error::LifecycleResult;
use async_trait::async_trait;

/// Lifecycle control of a consumer application.
#[async_trait]
pub trait ConsumerApi: Send + Sync {
    /// Run the connect sequence: before-hook, connect, open channel,
    /// watch for close, register the consumer, after-hook.
    async fn connect(&self) -> LifecycleResult<()>;

    /// Run the close sequence: before-hook, close channel, drain in-flight
    /// runs, close connection, after-hook.
    async fn close(&self) -> LifecycleResult<()>;

    /// Current lifecycle state.
    fn state(&self) -> LifecycleState;
}
