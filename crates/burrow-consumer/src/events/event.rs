//! # Application Events
//!
//! The two observable events an application emits.

use crate::domain::context::ContextSnapshot;
use crate::error::{BrokerError, ProcessingError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Events published on the application event bus.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// A message run failed. Emitted once per failed run.
    MessageFailed {
        /// The error the run failed with.
        error: Arc<ProcessingError>,
        /// The context of the failed run.
        context: ContextSnapshot,
    },

    /// The broker connection closed underneath the application.
    ConnectionClosed {
        /// Transport error, or `None` for a clean close.
        error: Option<BrokerError>,
    },
}

impl AppEvent {
    /// Get the topic for this event.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::MessageFailed { .. } => EventTopic::Error,
            Self::ConnectionClosed { .. } => EventTopic::Connection,
        }
    }

    /// Event name as seen by hosts (`"error"`, `"connection closed"`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageFailed { .. } => "error",
            Self::ConnectionClosed { .. } => "connection closed",
        }
    }
}

/// Event topics for filtering subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Failed message runs
    Error,
    /// Connection state notifications
    Connection,
    /// All topics
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &AppEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}
