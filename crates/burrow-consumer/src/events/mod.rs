//! Application event channel
//!
//! Failed message runs and connection drops are published here instead of
//! propagating. Hosts observe them through a [`Subscription`] or an
//! [`EventStream`].

pub mod bus;
pub mod event;
pub mod subscriber;

pub use bus::{EventPublisher, InMemoryEventBus};
pub use event::{AppEvent, EventFilter, EventTopic};
pub use subscriber::{EventStream, Subscription, SubscriptionError};
