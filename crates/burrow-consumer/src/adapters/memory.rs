//! In-memory broker adapter
//!
//! Implements the broker ports without a network. Every call is appended to
//! an ordered operation log, any call can be made to fail, and messages are
//! pushed to registered consumers with [`InMemoryBroker::deliver`].

use crate::domain::message::Delivery;
use crate::error::{BrokerError, BrokerResult};
use crate::ports::outbound::{
    BrokerChannel, BrokerConnection, BrokerConnector, CloseListener, DeliveryCallback,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// One recorded call against the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerOp {
    Connect { url: String },
    CreateChannel,
    Consume { queue: String },
    CloseChannel,
    CloseConnection,
}

/// Calls that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Connect,
    CreateChannel,
    Consume,
    CloseChannel,
    CloseConnection,
}

impl FailPoint {
    fn error(self, subject: &str) -> BrokerError {
        let reason = format!("injected failure: {subject}");
        match self {
            FailPoint::Connect => BrokerError::ConnectionFailed { reason },
            FailPoint::CreateChannel => BrokerError::ChannelFailed { reason },
            FailPoint::Consume => BrokerError::ConsumeFailed {
                queue: subject.to_string(),
                reason,
            },
            FailPoint::CloseChannel | FailPoint::CloseConnection => {
                BrokerError::CloseFailed { reason }
            }
        }
    }
}

struct Consumer {
    channel_id: u64,
    callback: DeliveryCallback,
}

struct ConnectionState {
    open: AtomicBool,
    listeners: Mutex<Vec<CloseListener>>,
}

impl ConnectionState {
    /// Mark closed and notify listeners once.
    fn shut(&self, error: Option<BrokerError>) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }
        let listeners = std::mem::take(&mut *self.listeners.lock());
        for listener in &listeners {
            listener(error.clone());
        }
        true
    }
}

#[derive(Default)]
struct Shared {
    ops: RwLock<Vec<BrokerOp>>,
    failures: RwLock<HashSet<FailPoint>>,
    consumers: RwLock<HashMap<String, Vec<Consumer>>>,
    connections: RwLock<HashMap<u64, Arc<ConnectionState>>>,
    next_id: AtomicU64,
    next_delivery_tag: AtomicU64,
}

impl Shared {
    fn record(&self, op: BrokerOp) {
        self.ops.write().push(op);
    }

    fn check(&self, point: FailPoint, subject: &str) -> BrokerResult<()> {
        if self.failures.read().contains(&point) {
            return Err(point.error(subject));
        }
        Ok(())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// In-memory broker for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call made so far, in order.
    pub fn ops(&self) -> Vec<BrokerOp> {
        self.shared.ops.read().clone()
    }

    pub fn clear_ops(&self) {
        self.shared.ops.write().clear();
    }

    /// Make every later call at `point` fail.
    pub fn fail_on(&self, point: FailPoint) {
        self.shared.failures.write().insert(point);
    }

    /// Undo [`fail_on`](Self::fail_on).
    pub fn recover(&self, point: FailPoint) {
        self.shared.failures.write().remove(&point);
    }

    /// Number of consumers registered on `queue`.
    pub fn consumer_count(&self, queue: &str) -> usize {
        self.shared
            .consumers
            .read()
            .get(queue)
            .map_or(0, |consumers| consumers.len())
    }

    /// Number of connections still open.
    pub fn open_connections(&self) -> usize {
        self.shared
            .connections
            .read()
            .values()
            .filter(|c| c.open.load(Ordering::Acquire))
            .count()
    }

    /// Push a message to the first consumer of `queue` and wait for its run.
    ///
    /// Assigns the next delivery tag if the message has none. Returns
    /// `false` when nobody consumes the queue.
    pub async fn deliver(&self, queue: &str, delivery: Delivery) -> bool {
        let callback = self
            .shared
            .consumers
            .read()
            .get(queue)
            .and_then(|consumers| consumers.first())
            .map(|consumer| Arc::clone(&consumer.callback));

        let Some(callback) = callback else {
            debug!(queue, "No consumer for delivery");
            return false;
        };

        let delivery = self.stamp(queue, delivery);
        callback(delivery).await;
        true
    }

    fn stamp(&self, queue: &str, mut delivery: Delivery) -> Delivery {
        if delivery.fields.delivery_tag == 0 {
            delivery.fields.delivery_tag =
                self.shared.next_delivery_tag.fetch_add(1, Ordering::Relaxed) + 1;
        }
        if delivery.fields.routing_key.is_empty() {
            delivery.fields.routing_key = queue.to_string();
        }
        delivery
    }

    /// Simulate the transport dropping every open connection.
    pub fn drop_connection(&self, error: Option<BrokerError>) {
        let connections: Vec<_> = self.shared.connections.read().values().cloned().collect();
        let mut dropped = 0;
        for connection in connections {
            if connection.shut(error.clone()) {
                dropped += 1;
            }
        }
        self.shared.consumers.write().clear();
        info!(dropped, error = ?error, "Broker connections dropped");
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    type Connection = InMemoryConnection;

    async fn connect(&self, url: &str) -> BrokerResult<InMemoryConnection> {
        self.shared.record(BrokerOp::Connect {
            url: url.to_string(),
        });
        self.shared.check(FailPoint::Connect, url)?;

        let id = self.shared.next_id();
        let state = Arc::new(ConnectionState {
            open: AtomicBool::new(true),
            listeners: Mutex::new(Vec::new()),
        });
        self.shared.connections.write().insert(id, Arc::clone(&state));

        Ok(InMemoryConnection {
            shared: Arc::clone(&self.shared),
            state,
        })
    }
}

/// Connection handed out by [`InMemoryBroker`].
pub struct InMemoryConnection {
    shared: Arc<Shared>,
    state: Arc<ConnectionState>,
}

impl InMemoryConnection {
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::Acquire)
    }
}

#[async_trait]
impl BrokerConnection for InMemoryConnection {
    type Channel = InMemoryChannel;

    async fn create_channel(&self) -> BrokerResult<InMemoryChannel> {
        self.shared.record(BrokerOp::CreateChannel);
        self.shared.check(FailPoint::CreateChannel, "channel")?;
        if !self.is_open() {
            return Err(BrokerError::ChannelFailed {
                reason: "connection is closed".to_string(),
            });
        }

        Ok(InMemoryChannel {
            id: self.shared.next_id(),
            shared: Arc::clone(&self.shared),
        })
    }

    fn on_close(&self, listener: CloseListener) {
        self.state.listeners.lock().push(listener);
    }

    async fn close(&self) -> BrokerResult<()> {
        self.shared.record(BrokerOp::CloseConnection);
        self.shared.check(FailPoint::CloseConnection, "connection")?;
        self.state.shut(None);
        Ok(())
    }
}

/// Channel handed out by [`InMemoryConnection`].
pub struct InMemoryChannel {
    id: u64,
    shared: Arc<Shared>,
}

#[async_trait]
impl BrokerChannel for InMemoryChannel {
    async fn consume(&self, queue: &str, callback: DeliveryCallback) -> BrokerResult<()> {
        self.shared.record(BrokerOp::Consume {
            queue: queue.to_string(),
        });
        self.shared.check(FailPoint::Consume, queue)?;

        self.shared
            .consumers
            .write()
            .entry(queue.to_string())
            .or_default()
            .push(Consumer {
                channel_id: self.id,
                callback,
            });
        Ok(())
    }

    async fn close(&self) -> BrokerResult<()> {
        self.shared.record(BrokerOp::CloseChannel);
        self.shared.check(FailPoint::CloseChannel, "channel")?;

        let mut consumers = self.shared.consumers.write();
        for registered in consumers.values_mut() {
            registered.retain(|c| c.channel_id != self.id);
        }
        consumers.retain(|_, registered| !registered.is_empty());
        Ok(())
    }
}
