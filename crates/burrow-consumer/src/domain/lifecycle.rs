//! Connection lifecycle state machine
//!
//! Guards against overlapping or repeated `connect()` / `close()` calls.
//!
//! ```text
//! [IDLE] ──connect()──→ [CONNECTING] ──ok──→ [CONNECTED] ──close()──→ [CLOSING] ──ok──→ [CLOSED]
//!                            │                                           │                │
//!                         failure                                     failure             │
//!                            ↓                                           │                │
//!                        [FAULTED] ←─────────────────────────────────────┘                │
//!                            │                                                            │
//!                            ├── connect() ──→ [CONNECTING] ←──────── connect() ──────────┘
//!                            └── close()   ──→ [CLOSING]
//! ```
//!
//! A failed step leaves the machine `Faulted`. Resources opened before the
//! failure are not rolled back; a later `close()` releases whichever exist.

use crate::domain::hooks::LifecycleEvent;
use crate::error::{LifecycleError, LifecycleResult};
use serde::{Deserialize, Serialize};

/// Where the application is in its connect/close lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Never connected
    #[default]
    Idle,
    /// `connect()` in progress
    Connecting,
    /// Consumer registered and receiving deliveries
    Connected,
    /// `close()` in progress
    Closing,
    /// Resources released
    Closed,
    /// Last `connect()` or `close()` failed part-way
    Faulted,
}

impl LifecycleState {
    /// State entered when `operation` starts, or the reason it may not.
    pub fn begin(self, operation: LifecycleEvent) -> LifecycleResult<LifecycleState> {
        match (self, operation) {
            (
                LifecycleState::Idle | LifecycleState::Closed | LifecycleState::Faulted,
                LifecycleEvent::Connect,
            ) => Ok(LifecycleState::Connecting),
            (LifecycleState::Connected | LifecycleState::Faulted, LifecycleEvent::Close) => {
                Ok(LifecycleState::Closing)
            }
            (state, operation) => Err(LifecycleError::InvalidState { operation, state }),
        }
    }

    /// State entered when `operation` finishes.
    pub fn finish(operation: LifecycleEvent, succeeded: bool) -> LifecycleState {
        match (operation, succeeded) {
            (LifecycleEvent::Connect, true) => LifecycleState::Connected,
            (LifecycleEvent::Close, true) => LifecycleState::Closed,
            (_, false) => LifecycleState::Faulted,
        }
    }

    /// True while an operation is running.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, LifecycleState::Connecting | LifecycleState::Closing)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, LifecycleState::Connected)
    }
}
