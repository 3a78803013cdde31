//! Error types for the consumer framework
//!
//! Four concerns, each with its own failure policy:
//!
//! | Error | Raised by | Policy |
//! |-------|-----------|--------|
//! | `ConfigError` | config construction | fail fast |
//! | `UsageError` | step/hook registration, `stack()` | fail fast at the call site |
//! | `ProcessingError` | a step during one message run | contained, reported as an event |
//! | `LifecycleError` | `connect()` / `close()` | surfaced to the caller, no rollback |

use crate::domain::hooks::{HookPhase, LifecycleEvent};
use crate::domain::lifecycle::LifecycleState;
use thiserror::Error;

/// Boxed error used for hook and step failures of arbitrary origin.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Configuration rejected at construction time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required key is absent
    #[error("Missing required configuration key: {key}")]
    MissingKey { key: &'static str },

    /// A key is present but holds the wrong kind of value
    #[error("Invalid value for configuration key {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    /// Legacy `hosts` variant with nothing to pick from
    #[error("Configuration key hosts must not be empty")]
    EmptyHosts,

    /// The configuration document was not a JSON object
    #[error("Configuration must be an object, got {found}")]
    NotAnObject { found: String },
}

/// Misuse of the application API by the host.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// Hook registered for an event outside `{connect, close}`
    #[error("Unsupported hook event: {event} (expected one of: connect, close)")]
    UnsupportedHookEvent { event: String },

    /// `stack()` requested before `listen()`
    #[error("Middleware stack not built - call listen() first")]
    StackNotBuilt,

    /// `listen()` called a second time
    #[error("listen() already called - the stack is built exactly once")]
    AlreadyListening,

    /// `use_step()` after the stack was built
    #[error("Steps are frozen once listen() has been called")]
    StepsFrozen,
}

/// Failure of a single message run.
///
/// Never escapes the delivery entry point: it is stored on the message
/// context and published as `AppEvent::MessageFailed`.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Plain failure message raised by a step
    #[error("{0}")]
    Message(String),

    /// Payload could not be decoded
    #[error("Failed to decode message payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Any other error raised by a step
    #[error(transparent)]
    Source(#[from] BoxError),
}

impl ProcessingError {
    /// Create a processing error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Wrap an arbitrary error.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Source(Box::new(error))
    }
}

/// Failure reported by the broker collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Connection could not be established
    #[error("Broker connection failed: {reason}")]
    ConnectionFailed { reason: String },

    /// Channel could not be opened
    #[error("Channel creation failed: {reason}")]
    ChannelFailed { reason: String },

    /// Consumer registration was refused
    #[error("Consume on queue {queue} failed: {reason}")]
    ConsumeFailed { queue: String, reason: String },

    /// Closing a resource failed
    #[error("Close failed: {reason}")]
    CloseFailed { reason: String },

    /// Transport dropped underneath an open connection
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },
}

/// Failure during `connect()` or `close()`.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A before/after hook returned an error
    #[error("{phase} hook for {event} failed: {source}")]
    Hook {
        event: LifecycleEvent,
        phase: HookPhase,
        #[source]
        source: BoxError,
    },

    /// The broker collaborator failed
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Operation not permitted in the current lifecycle state
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        operation: LifecycleEvent,
        state: LifecycleState,
    },

    /// The application was not ready for the operation
    #[error(transparent)]
    Usage(#[from] UsageError),
}

/// Umbrella error for callers that do not care which concern failed.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

/// Result type for configuration construction
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for step execution
pub type ProcessingResult<T> = Result<T, ProcessingError>;

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Result type for connect/close
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Result type for the umbrella error
pub type ConsumerResult<T> = Result<T, ConsumerError>;
