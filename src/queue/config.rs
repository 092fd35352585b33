//! Runtime configuration for the queue components.
//!
//! [`QueueConfig`] can be built in code, deserialized from JSON, or read from
//! the process environment with [`QueueConfig::from_env`]. Every field has a
//! default, so an empty environment yields a working in-process setup with
//! the event intake disabled.

use super::coordinator::{DEFAULT_STORE_TIMEOUT_MS, StatusPolicy};
use super::entry::DEFAULT_MINUTES_PER_ORDER;
use super::notifier::{
    DEFAULT_DISPATCH_CAPACITY, DEFAULT_OBSERVER_CAPACITY, OverflowPolicy,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Default number of deliveries the intake processes concurrently.
pub const DEFAULT_INTAKE_PREFETCH: usize = 16;

/// Default JetStream stream carrying order lifecycle events.
pub const DEFAULT_STREAM_NAME: &str = "CANTEEN_ORDERS";

/// Default durable consumer name of the queue service.
pub const DEFAULT_CONSUMER_NAME: &str = "queue-service-orders";

/// Routing keys the intake subscribes to.
pub const DEFAULT_ORDER_SUBJECTS: [&str; 3] =
    ["order.confirmed", "order.completed", "order.cancelled"];

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be parsed.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A JSON configuration document could not be parsed.
    #[error("invalid configuration document: {0}")]
    Document(#[from] serde_json::Error),
}

/// Settings of the change notifier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Capacity of the channel between the coordinator and the dispatcher.
    pub dispatch_capacity: usize,
    /// Outbound buffer of each observer.
    pub observer_capacity: usize,
    /// What happens when an observer buffer is full.
    pub overflow_policy: OverflowPolicy,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            dispatch_capacity: DEFAULT_DISPATCH_CAPACITY,
            observer_capacity: DEFAULT_OBSERVER_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// Settings of the event intake.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Broker URL. The intake is disabled when this is `None`.
    pub nats_url: Option<String>,
    /// Stream holding order lifecycle events.
    pub stream_name: String,
    /// Durable consumer name.
    pub consumer_name: String,
    /// Subjects consumed by the intake.
    pub subjects: Vec<String>,
    /// Deliveries processed concurrently; also the broker's ack-pending limit.
    pub prefetch: usize,
}

impl IntakeConfig {
    /// Returns `true` when a broker is configured.
    pub fn is_enabled(&self) -> bool {
        self.nats_url.is_some()
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            nats_url: None,
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            consumer_name: DEFAULT_CONSUMER_NAME.to_string(),
            subjects: DEFAULT_ORDER_SUBJECTS.iter().map(|s| s.to_string()).collect(),
            prefetch: DEFAULT_INTAKE_PREFETCH,
        }
    }
}

/// Top-level queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Minutes each order ahead adds to the estimate.
    pub minutes_per_order: u32,
    /// Upper bound for each store call, in milliseconds.
    pub store_timeout_ms: u64,
    /// Status transition policy.
    pub status_policy: StatusPolicy,
    /// Optional snapshot file for the in-memory store.
    pub snapshot_path: Option<PathBuf>,
    /// Change notifier settings.
    pub notifier: NotifierConfig,
    /// Event intake settings.
    pub intake: IntakeConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            minutes_per_order: DEFAULT_MINUTES_PER_ORDER,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            status_policy: StatusPolicy::default(),
            snapshot_path: None,
            notifier: NotifierConfig::default(),
            intake: IntakeConfig::default(),
        }
    }
}

impl QueueConfig {
    /// Reads the configuration from the process environment.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `QUEUE_MINUTES_PER_ORDER` | `minutes_per_order` |
    /// | `QUEUE_STORE_TIMEOUT_MS` | `store_timeout_ms` |
    /// | `QUEUE_STATUS_POLICY` | `status_policy` (`permissive` / `strict`) |
    /// | `QUEUE_SNAPSHOT_PATH` | `snapshot_path` |
    /// | `QUEUE_DISPATCH_BUFFER` | `notifier.dispatch_capacity` |
    /// | `QUEUE_OBSERVER_BUFFER` | `notifier.observer_capacity` |
    /// | `QUEUE_OVERFLOW_POLICY` | `notifier.overflow_policy` (`drop_newest` / `disconnect`) |
    /// | `QUEUE_INTAKE_PREFETCH` | `intake.prefetch` |
    /// | `NATS_URL` | `intake.nats_url` |
    ///
    /// Unset or empty variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(value) = get("QUEUE_MINUTES_PER_ORDER") {
            config.minutes_per_order = parse_number("QUEUE_MINUTES_PER_ORDER", &value)?;
        }
        if let Some(value) = get("QUEUE_STORE_TIMEOUT_MS") {
            config.store_timeout_ms = parse_positive("QUEUE_STORE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = get("QUEUE_STATUS_POLICY") {
            config.status_policy = match value.trim().to_ascii_lowercase().as_str() {
                "permissive" => StatusPolicy::Permissive,
                "strict" => StatusPolicy::Strict,
                _ => {
                    return Err(invalid(
                        "QUEUE_STATUS_POLICY",
                        &value,
                        "expected permissive or strict",
                    ));
                }
            };
        }
        if let Some(value) = get("QUEUE_SNAPSHOT_PATH") {
            config.snapshot_path = Some(PathBuf::from(value));
        }
        if let Some(value) = get("QUEUE_DISPATCH_BUFFER") {
            config.notifier.dispatch_capacity = parse_positive("QUEUE_DISPATCH_BUFFER", &value)?;
        }
        if let Some(value) = get("QUEUE_OBSERVER_BUFFER") {
            config.notifier.observer_capacity = parse_positive("QUEUE_OBSERVER_BUFFER", &value)?;
        }
        if let Some(value) = get("QUEUE_OVERFLOW_POLICY") {
            config.notifier.overflow_policy = match value.trim().to_ascii_lowercase().as_str() {
                "drop_newest" => OverflowPolicy::DropNewest,
                "disconnect" => OverflowPolicy::Disconnect,
                _ => {
                    return Err(invalid(
                        "QUEUE_OVERFLOW_POLICY",
                        &value,
                        "expected drop_newest or disconnect",
                    ));
                }
            };
        }
        if let Some(value) = get("QUEUE_INTAKE_PREFETCH") {
            config.intake.prefetch = parse_positive("QUEUE_INTAKE_PREFETCH", &value)?;
        }
        if let Some(value) = get("NATS_URL") {
            config.intake.nats_url = Some(value);
        }

        Ok(config)
    }

    /// Parses a JSON configuration document. Missing fields keep defaults.
    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(data)?)
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|error: T::Err| invalid(key, value, &error.to_string()))
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let parsed: T = parse_number(key, value)?;
    if parsed == T::default() {
        return Err(invalid(key, value, "must be greater than zero"));
    }
    Ok(parsed)
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
