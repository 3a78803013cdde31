//! Per-message execution context
//!
//! One `Context` is built for every inbound delivery and dropped when that
//! delivery's run ends. It is exclusive to its run, so the interior locks
//! are never contended across messages.

use crate::domain::config::AppConfig;
use crate::domain::message::Delivery;
use crate::error::ProcessingError;
use crate::events::{AppEvent, EventPublisher, InMemoryEventBus};
use crate::metrics::ConsumerMetrics;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Shared view of the owning application handed to every context.
#[derive(Clone)]
pub struct AppHandle {
    config: Arc<AppConfig>,
    events: Arc<InMemoryEventBus>,
    metrics: Arc<ConsumerMetrics>,
}

impl AppHandle {
    pub(crate) fn new(
        config: Arc<AppConfig>,
        events: Arc<InMemoryEventBus>,
        metrics: Arc<ConsumerMetrics>,
    ) -> Self {
        Self {
            config,
            events,
            metrics,
        }
    }

    /// Read one configuration value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<InMemoryEventBus> {
        &self.events
    }

    pub fn metrics(&self) -> &Arc<ConsumerMetrics> {
        &self.metrics
    }
}

impl fmt::Debug for AppHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppHandle")
            .field("queue", &self.config.queue_name())
            .finish()
    }
}

/// Execution context for one message run.
pub struct Context {
    id: Uuid,
    app: AppHandle,
    message: Arc<Delivery>,
    error: Mutex<Option<Arc<ProcessingError>>>,
    state: Mutex<HashMap<String, Value>>,
}

impl Context {
    pub(crate) fn new(app: AppHandle, message: Delivery) -> Self {
        Self {
            id: Uuid::new_v4(),
            app,
            message: Arc::new(message),
            error: Mutex::new(None),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Identifier of this run, for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The owning application.
    pub fn app(&self) -> &AppHandle {
        &self.app
    }

    /// The delivery being processed.
    pub fn message(&self) -> &Delivery {
        &self.message
    }

    /// Error recorded for this run, if it failed.
    pub fn error(&self) -> Option<Arc<ProcessingError>> {
        self.error.lock().clone()
    }

    /// Store a value for downstream steps.
    pub fn set_state(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.lock().insert(key.into(), value.into());
    }

    /// Value stored by an upstream step.
    pub fn state(&self, key: &str) -> Option<Value> {
        self.state.lock().get(key).cloned()
    }

    /// Record the failure of this run and publish it as an `error` event.
    ///
    /// Always stores the error first, then emits.
    pub async fn report_error(&self, error: ProcessingError) -> Arc<ProcessingError> {
        let error = Arc::new(error);
        *self.error.lock() = Some(Arc::clone(&error));

        warn!(
            run_id = %self.id,
            delivery_tag = self.message.fields.delivery_tag,
            routing_key = %self.message.fields.routing_key,
            error = %error,
            "Message run failed"
        );

        self.app
            .events
            .publish(AppEvent::MessageFailed {
                error: Arc::clone(&error),
                context: self.snapshot(),
            })
            .await;

        error
    }

    /// Owned copy of the context for event payloads.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            id: self.id,
            message: Arc::clone(&self.message),
            state: self.state.lock().clone(),
            error: self.error(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("delivery_tag", &self.message.fields.delivery_tag)
            .field("failed", &self.error.lock().is_some())
            .finish()
    }
}

/// What an `error` event carries about the failed run.
#[derive(Clone, Debug)]
pub struct ContextSnapshot {
    pub id: Uuid,
    pub message: Arc<Delivery>,
    pub state: HashMap<String, Value>,
    pub error: Option<Arc<ProcessingError>>,
}
