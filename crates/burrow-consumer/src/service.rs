//! Consumer Application - lifecycle and registration surface
//!
//! Owns the step list, the hooks, the broker resources and the event bus.
//! `connect()` and `close()` are strictly sequential:
//!
//! ```text
//! connect: before-hook → connect → create channel → on_close → consume → after-hook
//! close:   before-hook → close channel → drain in-flight → close connection → after-hook
//! ```
//!
//! Any failure aborts the remaining steps, leaves the application `Faulted`
//! and is returned to the caller. Nothing opened before the failure is
//! rolled back; the next `connect()` closes whatever is left before opening
//! fresh resources. A connection that drops before `connect()` completes
//! fails the attempt.

use crate::dispatch::{Dispatcher, InFlight};
use crate::domain::compose::{compose, ComposedStack, Step};
use crate::domain::config::AppConfig;
use crate::domain::context::{AppHandle, Context};
use crate::domain::hooks::{Hook, HookPhase, HookRegistry, LifecycleEvent};
use crate::domain::lifecycle::LifecycleState;
use crate::domain::message::Delivery;
use crate::error::{BrokerError, ConfigResult, LifecycleError, LifecycleResult, UsageError};
use crate::events::{AppEvent, EventFilter, InMemoryEventBus, Subscription};
use crate::metrics::ConsumerMetrics;
use crate::ports::inbound::ConsumerApi;
use crate::ports::outbound::{
    BrokerChannel, BrokerConnection, BrokerConnector, ChannelOf, CloseListener,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Broker resources owned by a connected application.
struct Session<B: BrokerConnector> {
    connection: Option<B::Connection>,
    channel: Option<ChannelOf<B>>,
}

impl<B: BrokerConnector> Default for Session<B> {
    fn default() -> Self {
        Self {
            connection: None,
            channel: None,
        }
    }
}

/// Lifecycle state shared with the broker close listener.
#[derive(Debug)]
struct Status {
    state: LifecycleState,
    /// Bumped per connect attempt. Listeners of older connections are ignored.
    generation: u64,
    /// Set when the current connection closes while still connecting.
    lost: Option<BrokerError>,
}

impl Status {
    fn new() -> Self {
        Self {
            state: LifecycleState::Idle,
            generation: 0,
            lost: None,
        }
    }
}

/// A queue consumer: steps, hooks and the broker lifecycle around them.
pub struct Application<B: BrokerConnector> {
    app: AppHandle,
    broker: Arc<B>,
    steps: Vec<Arc<dyn Step>>,
    stack: Option<Arc<ComposedStack>>,
    hooks: HookRegistry,
    status: Arc<Mutex<Status>>,
    session: tokio::sync::Mutex<Session<B>>,
    in_flight: Arc<InFlight>,
}

impl<B: BrokerConnector> Application<B> {
    /// Create an application from a validated configuration.
    pub fn new(config: AppConfig, broker: Arc<B>) -> Self {
        let events = Arc::new(InMemoryEventBus::with_capacity(config.event_capacity()));
        let app = AppHandle::new(Arc::new(config), events, Arc::new(ConsumerMetrics::new()));

        Self {
            app,
            broker,
            steps: Vec::new(),
            stack: None,
            hooks: HookRegistry::new(),
            status: Arc::new(Mutex::new(Status::new())),
            session: tokio::sync::Mutex::new(Session::default()),
            in_flight: Arc::new(InFlight::new()),
        }
    }

    /// Validate `values` and create an application.
    pub fn from_map(values: Map<String, Value>, broker: Arc<B>) -> ConfigResult<Self> {
        Ok(Self::new(AppConfig::from_map(values)?, broker))
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Append a step to the chain.
    pub fn use_step<S: Step + 'static>(&mut self, step: S) -> Result<&mut Self, UsageError> {
        if self.stack.is_some() {
            return Err(UsageError::StepsFrozen);
        }
        self.steps.push(Arc::new(step));
        Ok(self)
    }

    /// Append the terminal step and compose the chain. Allowed once.
    pub fn listen<S: Step + 'static>(&mut self, terminal: S) -> Result<&mut Self, UsageError> {
        if self.stack.is_some() {
            return Err(UsageError::AlreadyListening);
        }
        self.steps.push(Arc::new(terminal));

        let stack = compose(self.steps.clone());
        info!(steps = stack.len(), names = ?stack.step_names(), "Stack composed");
        self.stack = Some(Arc::new(stack));
        Ok(self)
    }

    /// The composed stack. Every call returns the same instance.
    pub fn stack(&self) -> Result<Arc<ComposedStack>, UsageError> {
        self.stack.clone().ok_or(UsageError::StackNotBuilt)
    }

    /// Register the hook run before `event`. Replaces any earlier one.
    pub fn register_before_hook<H: Hook + 'static>(
        &mut self,
        event: &str,
        hook: H,
    ) -> Result<&mut Self, UsageError> {
        self.register_hook(event, HookPhase::Before, Arc::new(hook))
    }

    /// Register the hook run after `event`. Replaces any earlier one.
    pub fn register_after_hook<H: Hook + 'static>(
        &mut self,
        event: &str,
        hook: H,
    ) -> Result<&mut Self, UsageError> {
        self.register_hook(event, HookPhase::After, Arc::new(hook))
    }

    fn register_hook(
        &mut self,
        event: &str,
        phase: HookPhase,
        hook: Arc<dyn Hook>,
    ) -> Result<&mut Self, UsageError> {
        let event: LifecycleEvent = event.parse()?;
        self.hooks.register(event, phase, hook);
        Ok(self)
    }

    pub fn before_hook(&self, event: LifecycleEvent) -> Option<Arc<dyn Hook>> {
        self.hooks.get(event, HookPhase::Before)
    }

    pub fn after_hook(&self, event: LifecycleEvent) -> Option<Arc<dyn Hook>> {
        self.hooks.get(event, HookPhase::After)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// One configuration value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.app.get(key)
    }

    pub fn config(&self) -> &AppConfig {
        self.app.config()
    }

    /// Build the context a delivery would run with.
    pub fn create_context(&self, delivery: Delivery) -> Context {
        Context::new(self.app.clone(), delivery)
    }

    /// Subscribe to application events published from now on.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.app.events().subscribe(filter)
    }

    pub fn events(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(self.app.events())
    }

    pub fn metrics(&self) -> Arc<ConsumerMetrics> {
        Arc::clone(self.app.metrics())
    }

    pub fn state(&self) -> LifecycleState {
        self.status.lock().state
    }

    /// Message runs started and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open broker resources and start consuming.
    pub async fn connect(&self) -> LifecycleResult<()> {
        let stack = self.stack()?;
        let generation = self.begin(LifecycleEvent::Connect)?;

        let result = self.open(stack, generation).await;
        self.finish(LifecycleEvent::Connect, result)
    }

    /// Stop consuming, drain in-flight runs and release broker resources.
    pub async fn close(&self) -> LifecycleResult<()> {
        self.begin(LifecycleEvent::Close)?;

        let result = self.shutdown().await;
        self.finish(LifecycleEvent::Close, result)
    }

    async fn open(&self, stack: Arc<ComposedStack>, generation: u64) -> LifecycleResult<()> {
        let queue = self.config().queue_name();
        info!(queue, "Connecting consumer");

        self.run_hook(LifecycleEvent::Connect, HookPhase::Before)
            .await?;

        let mut session = self.session.lock().await;
        if session.connection.is_some() || session.channel.is_some() {
            debug!("Releasing broker resources left by an earlier attempt");
            Self::close_channel(&mut session).await?;
            Self::close_connection(&mut session).await?;
        }

        // Resolved per attempt so host lists pick a fresh host
        let url = self.config().connection_url();
        debug!("Opening broker connection");
        let connection = session.connection.insert(self.broker.connect(&url).await?);
        self.app.metrics().record_connection_opened();

        debug!("Opening channel");
        let channel = connection.create_channel().await?;
        connection.on_close(self.close_listener(generation));
        let channel = session.channel.insert(channel);

        let dispatcher = Dispatcher::new(
            ComposedStack::clone(&stack),
            self.app.clone(),
            Arc::clone(&self.in_flight),
        );
        debug!(queue, "Registering consumer");
        channel
            .consume(queue, Arc::new(dispatcher).into_callback())
            .await?;
        drop(session);

        self.run_hook(LifecycleEvent::Connect, HookPhase::After)
            .await?;

        info!(queue, "Consumer connected");
        Ok(())
    }

    async fn shutdown(&self) -> LifecycleResult<()> {
        info!(queue = self.config().queue_name(), "Closing consumer");

        self.run_hook(LifecycleEvent::Close, HookPhase::Before)
            .await?;

        let mut session = self.session.lock().await;
        Self::close_channel(&mut session).await?;
        self.drain().await;
        Self::close_connection(&mut session).await?;
        drop(session);

        self.run_hook(LifecycleEvent::Close, HookPhase::After)
            .await?;

        info!("Consumer closed");
        Ok(())
    }

    /// Close the channel, if any. The slot is cleared only on success.
    async fn close_channel(session: &mut Session<B>) -> LifecycleResult<()> {
        if let Some(channel) = session.channel.as_ref() {
            debug!("Closing channel");
            channel.close().await?;
            session.channel = None;
        }
        Ok(())
    }

    async fn close_connection(session: &mut Session<B>) -> LifecycleResult<()> {
        if let Some(connection) = session.connection.as_ref() {
            debug!("Closing connection");
            connection.close().await?;
            session.connection = None;
        }
        Ok(())
    }

    /// Wait for in-flight runs, bounded by the configured drain timeout.
    async fn drain(&self) {
        let pending = self.in_flight.count();
        if pending == 0 {
            return;
        }

        let limit = self.config().drain_timeout();
        info!(pending, timeout_ms = limit.as_millis() as u64, "Draining in-flight runs");

        if !self.in_flight.wait_idle(limit).await {
            warn!(
                abandoned = self.in_flight.count(),
                "Drain timed out, abandoning in-flight runs"
            );
        }
    }

    async fn run_hook(&self, event: LifecycleEvent, phase: HookPhase) -> LifecycleResult<()> {
        let Some(hook) = self.hooks.get(event, phase) else {
            return Ok(());
        };

        debug!(%event, %phase, "Running hook");
        hook.run()
            .await
            .map_err(|source| LifecycleError::Hook {
                event,
                phase,
                source,
            })
    }

    /// Re-emits close notifications of the connection opened by attempt
    /// `generation` as `ConnectionClosed` events.
    fn close_listener(&self, generation: u64) -> CloseListener {
        let status = Arc::clone(&self.status);
        let events = Arc::clone(self.app.events());
        let metrics = Arc::clone(self.app.metrics());

        Box::new(move |error: Option<BrokerError>| {
            {
                let mut status = status.lock();
                if status.generation != generation {
                    debug!(generation, "Superseded broker connection closed");
                    metrics.record_connection_closed();
                    return;
                }

                match status.state {
                    LifecycleState::Closing | LifecycleState::Closed => {
                        info!("Broker connection closed");
                        metrics.record_connection_closed();
                    }
                    LifecycleState::Connecting => {
                        warn!(error = ?error, "Broker connection lost while connecting");
                        metrics.record_connection_lost();
                        status.lost = Some(error.clone().unwrap_or_else(|| {
                            BrokerError::ConnectionLost {
                                reason: "connection closed while connecting".to_string(),
                            }
                        }));
                    }
                    state => {
                        warn!(error = ?error, ?state, "Broker connection lost");
                        metrics.record_connection_lost();
                        if state.is_connected() {
                            status.state = LifecycleState::Faulted;
                        }
                    }
                }
            }
            events.emit(AppEvent::ConnectionClosed { error });
        })
    }

    /// Enter `operation`. Returns the connect generation.
    fn begin(&self, operation: LifecycleEvent) -> LifecycleResult<u64> {
        let mut status = self.status.lock();
        status.state = status.state.begin(operation)?;
        if operation == LifecycleEvent::Connect {
            status.generation += 1;
            status.lost = None;
        }
        Ok(status.generation)
    }

    fn finish(
        &self,
        operation: LifecycleEvent,
        result: LifecycleResult<()>,
    ) -> LifecycleResult<()> {
        let mut status = self.status.lock();
        let result = match (operation, result) {
            (LifecycleEvent::Connect, Ok(())) => match status.lost.take() {
                Some(lost) => Err(LifecycleError::Broker(lost)),
                None => Ok(()),
            },
            (_, result) => result,
        };

        if let Err(e) = &result {
            error!(%operation, error = %e, "Lifecycle operation failed");
        }
        status.state = LifecycleState::finish(operation, result.is_ok());
        debug!(%operation, state = ?status.state, "Lifecycle transition");
        result
    }
}

#[async_trait]
impl<B: BrokerConnector> ConsumerApi for Application<B> {
    async fn connect(&self) -> LifecycleResult<()> {
        Application::connect(self).await
    }

    async fn close(&self) -> LifecycleResult<()> {
        Application::close(self).await
    }

    fn state(&self) -> LifecycleState {
        Application::state(self)
    }
}

impl<B: BrokerConnector> fmt::Debug for Application<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("queue", &self.config().queue_name())
            .field("steps", &self.steps.len())
            .field("listening", &self.stack.is_some())
            .field("hooks", &self.hooks)
            .field("state", &self.state())
            .finish()
    }
}
