//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implementations of the outbound broker ports. Production deployments
//! plug in their own AMQP client adapter; the in-memory broker covers tests
//! and embedding.

mod memory;

pub use memory::{BrokerOp, FailPoint, InMemoryBroker, InMemoryChannel, InMemoryConnection};
