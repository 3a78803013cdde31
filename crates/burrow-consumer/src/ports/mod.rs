//! Ports for the consumer application
//!
//! Inbound: what hosts call. Outbound: what the broker client must provide.

pub mod inbound;
pub mod outbound;

pub use inbound::ConsumerApi;
pub use outbound::{
    BrokerChannel, BrokerConnection, BrokerConnector, ChannelOf, CloseListener, DeliveryCallback,
};
