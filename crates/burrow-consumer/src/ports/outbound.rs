//! Driven Ports (SPI - Outbound Dependencies)
//!
//! The broker client is an external collaborator. These traits describe the
//! only surface the application relies on: open a connection, open a
//! channel, register a consumer, close both, and hear about transport drops.
//! Acknowledgement, prefetch and topology stay with the client.

use crate::domain::message::Delivery;
use crate::error::{BrokerError, BrokerResult};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Callback invoked once per inbound message.
///
/// The returned future completes when the message run has finished. Clients
/// decide whether to await it or spawn it; the application imposes neither.
pub type DeliveryCallback = Arc<dyn Fn(Delivery) -> BoxFuture<'static, ()> + Send + Sync>;

/// Listener told when a connection closes, with the transport error if any.
pub type CloseListener = Box<dyn Fn(Option<BrokerError>) + Send + Sync>;

/// Entry point to the broker.
#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    type Connection: BrokerConnection;

    /// Establish a connection to `url`.
    async fn connect(&self, url: &str) -> BrokerResult<Self::Connection>;
}

/// An open broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    type Channel: BrokerChannel;

    /// Open a channel on this connection.
    async fn create_channel(&self) -> BrokerResult<Self::Channel>;

    /// Register a listener for the connection's close notification.
    fn on_close(&self, listener: CloseListener);

    /// Close the connection.
    async fn close(&self) -> BrokerResult<()>;
}

/// An open channel.
#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    /// Start delivering messages from `queue` to `callback`.
    async fn consume(&self, queue: &str, callback: DeliveryCallback) -> BrokerResult<()>;

    /// Close the channel; no deliveries follow once this returns.
    async fn close(&self) -> BrokerResult<()>;
}

/// Channel type produced by a connector.
pub type ChannelOf<B> = <<B as BrokerConnector>::Connection as BrokerConnection>::Channel;
