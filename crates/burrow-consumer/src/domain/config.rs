//! Application configuration
//!
//! The configuration is an immutable string-keyed map validated once, at
//! construction. Two connection variants are recognised:
//!
//! - `rabbitUrl` + `queueName` (preferred)
//! - `hosts` + `username` + `password` + `queueName` (legacy; the URL is
//!   derived through [`build_url`] on every `connect()`)
//!
//! Unknown keys are kept and remain readable through [`AppConfig::get`].

use crate::domain::url::{build_url, Hosts};
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::time::Duration;

/// Key holding the full broker connection string
pub const KEY_RABBIT_URL: &str = "rabbitUrl";
/// Key holding the queue to consume from
pub const KEY_QUEUE_NAME: &str = "queueName";
/// Legacy key: a broker address or list of addresses
pub const KEY_HOSTS: &str = "hosts";
/// Legacy key: broker user
pub const KEY_USERNAME: &str = "username";
/// Legacy key: broker password
pub const KEY_PASSWORD: &str = "password";
/// Upper bound on how long `close()` waits for in-flight runs
pub const KEY_DRAIN_TIMEOUT_MS: &str = "drainTimeoutMs";
/// Broadcast buffer size of the application event bus
pub const KEY_EVENT_CAPACITY: &str = "eventCapacity";

/// Default drain bound for `close()`
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;

/// Default event bus capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 1_000;

/// Where the broker lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerEndpoint {
    /// Fixed connection string
    Url(String),
    /// Host pool with credentials; resolved per connection attempt
    Hosts {
        hosts: Hosts,
        username: String,
        password: String,
    },
}

impl BrokerEndpoint {
    /// Resolve the connection string for one connection attempt.
    pub fn resolve(&self) -> String {
        match self {
            BrokerEndpoint::Url(url) => url.clone(),
            BrokerEndpoint::Hosts {
                hosts,
                username,
                password,
            } => build_url(hosts, username, password),
        }
    }
}

/// Validated, immutable application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    values: Map<String, Value>,
    endpoint: BrokerEndpoint,
    queue_name: String,
    drain_timeout: Duration,
    event_capacity: usize,
}

impl AppConfig {
    /// Validate a raw key/value map.
    pub fn from_map(values: Map<String, Value>) -> ConfigResult<Self> {
        let queue_name = required_str(&values, KEY_QUEUE_NAME)?.to_string();

        let endpoint = match values.get(KEY_RABBIT_URL) {
            Some(_) => BrokerEndpoint::Url(required_str(&values, KEY_RABBIT_URL)?.to_string()),
            None if values.contains_key(KEY_HOSTS) => legacy_endpoint(&values)?,
            None => return Err(ConfigError::MissingKey { key: KEY_RABBIT_URL }),
        };

        let drain_timeout = match values.get(KEY_DRAIN_TIMEOUT_MS) {
            None => Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
            Some(v) => Duration::from_millis(v.as_u64().ok_or_else(|| ConfigError::InvalidValue {
                key: KEY_DRAIN_TIMEOUT_MS,
                reason: format!("expected a non-negative integer, got {v}"),
            })?),
        };

        let event_capacity = match values.get(KEY_EVENT_CAPACITY) {
            None => DEFAULT_EVENT_CAPACITY,
            Some(v) => match v.as_u64() {
                Some(n) if n > 0 => usize::try_from(n).unwrap_or(usize::MAX),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: KEY_EVENT_CAPACITY,
                        reason: format!("expected a positive integer, got {v}"),
                    })
                }
            },
        };

        Ok(Self {
            values,
            endpoint,
            queue_name,
            drain_timeout,
            event_capacity,
        })
    }

    /// Validate a JSON document, which must be an object.
    pub fn from_json(value: Value) -> ConfigResult<Self> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(ConfigError::NotAnObject {
                found: json_kind(&other).to_string(),
            }),
        }
    }

    /// Start building a configuration in code.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Read one configuration value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The whole configuration map.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Queue the consumer is bound to.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Broker location.
    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    /// Connection string for the next connection attempt.
    pub fn connection_url(&self) -> String {
        self.endpoint.resolve()
    }

    /// How long `close()` waits for in-flight runs.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Buffer size of the application event bus.
    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }
}

fn required_str<'a>(values: &'a Map<String, Value>, key: &'static str) -> ConfigResult<&'a str> {
    match values.get(key) {
        None | Some(Value::Null) => Err(ConfigError::MissingKey { key }),
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) => Err(ConfigError::InvalidValue {
            key,
            reason: "must not be empty".to_string(),
        }),
        Some(other) => Err(ConfigError::InvalidValue {
            key,
            reason: format!("expected a string, got {}", json_kind(other)),
        }),
    }
}

fn legacy_endpoint(values: &Map<String, Value>) -> ConfigResult<BrokerEndpoint> {
    let raw = values
        .get(KEY_HOSTS)
        .cloned()
        .ok_or(ConfigError::MissingKey { key: KEY_HOSTS })?;
    let hosts: Hosts = serde_json::from_value(raw).map_err(|e| ConfigError::InvalidValue {
        key: KEY_HOSTS,
        reason: e.to_string(),
    })?;
    if hosts.is_empty() {
        return Err(ConfigError::EmptyHosts);
    }

    Ok(BrokerEndpoint::Hosts {
        hosts,
        username: required_str(values, KEY_USERNAME)?.to_string(),
        password: required_str(values, KEY_PASSWORD)?.to_string(),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// In-code construction of an [`AppConfig`]; validated by [`build`](Self::build).
#[derive(Debug, Default, Clone)]
pub struct AppConfigBuilder {
    values: Map<String, Value>,
}

impl AppConfigBuilder {
    pub fn rabbit_url(self, url: impl Into<String>) -> Self {
        self.set(KEY_RABBIT_URL, Value::String(url.into()))
    }

    pub fn queue_name(self, queue: impl Into<String>) -> Self {
        self.set(KEY_QUEUE_NAME, Value::String(queue.into()))
    }

    pub fn hosts(self, hosts: Hosts) -> Self {
        let value = match hosts {
            Hosts::Single(host) => Value::String(host),
            Hosts::Many(pool) => Value::Array(pool.into_iter().map(Value::String).collect()),
        };
        self.set(KEY_HOSTS, value)
    }

    pub fn credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.set(KEY_USERNAME, Value::String(username.into()))
            .set(KEY_PASSWORD, Value::String(password.into()))
    }

    pub fn drain_timeout(self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.set(KEY_DRAIN_TIMEOUT_MS, Value::from(millis))
    }

    /// Set an arbitrary key.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ConfigResult<AppConfig> {
        AppConfig::from_map(self.values)
    }
}
