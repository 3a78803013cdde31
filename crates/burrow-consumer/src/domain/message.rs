//! Inbound message as handed over by the broker collaborator.

use crate::error::ProcessingResult;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Delivery metadata assigned by the broker.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFields {
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
}

/// Publisher-supplied message properties.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub correlation_id: Option<String>,
    pub message_id: Option<String>,
    pub reply_to: Option<String>,
    pub timestamp: Option<u64>,
    pub headers: HashMap<String, Value>,
}

/// One message: payload bytes plus metadata.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Delivery {
    pub content: Bytes,
    pub fields: DeliveryFields,
    pub properties: MessageProperties,
}

impl Delivery {
    /// Create a delivery carrying only a payload.
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_fields(mut self, fields: DeliveryFields) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_properties(mut self, properties: MessageProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Decode the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> ProcessingResult<T> {
        Ok(serde_json::from_slice(&self.content)?)
    }

    /// Payload as UTF-8, if valid.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }

    /// Look up a header value.
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.properties.headers.get(name)
    }
}
