//! # Burrow Telemetry
//!
//! Logging setup for processes that host a Burrow consumer. The consumer
//! library only emits `tracing` events; this crate installs the subscriber.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use burrow_telemetry::{init_logging, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_logging(&config).expect("Failed to init logging");
//!
//!     // Consumer runs here
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BURROW_LOG_LEVEL` | `RUST_LOG`, then `info` | Filter directives |
//! | `BURROW_JSON_LOGS` | `false` (`true` in containers) | JSON output |
//! | `BURROW_SERVICE_NAME` | `burrow` | Service name attached to the startup event |
//! | `BURROW_CONSOLE_OUTPUT` | `true` | Disable to keep only the filter installed |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging, try_init_for_tests};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to install global subscriber: {0}")]
    AlreadyInitialized(String),
}
