//! Work queue configuration.
use crate::amqp::configuration::BrokerOptions;
use serde::{Deserialize, Deserializer};
use serde_aux::field_attributes::deserialize_number_from_string;
use std::time::Duration;

/// Name of the exchange used when none is configured.
pub const DEFAULT_EXCHANGE_NAME: &str = "hop.exchange";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
/// Configuration of a [`WorkQueue`](crate::WorkQueue).
///
/// It is immutable once the work queue has been built and shared by every topic,
/// job and pooled channel created from it.
///
/// Durations are expressed in whole seconds (`max_connection_retry_seconds`) and
/// milliseconds (`pull_interval_ms`) when deserialized, so the struct can be loaded
/// straight from environment variables or a configuration file.
pub struct Config {
    /// Name of the direct exchange every topic is bound to.
    ///
    /// Please DO NOT use a pre-existing exchange name: an exchange created by somebody
    /// else is not guaranteed to have the properties required for work queue semantics,
    /// and declaring it with different parameters fails.
    pub exchange_name: String,
    /// Whether queues and messages should be saved to disk to survive broker restarts.
    pub persistent: bool,
    /// Total time spent trying to (re)connect to the broker before giving up for good.
    #[serde(
        rename = "max_connection_retry_seconds",
        deserialize_with = "deserialize_seconds"
    )]
    pub max_connection_retry: Duration,
    /// Number of channels kept open for reuse. It does not limit concurrency: operations
    /// beyond it (pending jobs included) get a channel of their own, closed once released.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_channels: usize,
    /// Pause between two empty polls while pulling. Zero retries straight away.
    #[serde(rename = "pull_interval_ms", deserialize_with = "deserialize_millis")]
    pub pull_interval: Duration,
    /// Wait for the broker to confirm every published message.
    pub publisher_confirms: bool,
    /// Options forwarded to the broker session.
    pub broker: BrokerOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange_name: DEFAULT_EXCHANGE_NAME.into(),
            persistent: false,
            max_connection_retry: Duration::from_secs(15 * 60),
            max_channels: 64,
            pull_interval: Duration::ZERO,
            publisher_confirms: false,
            broker: BrokerOptions::default(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_exchange_name(mut self, exchange_name: impl Into<String>) -> Self {
        self.exchange_name = exchange_name.into();
        self
    }

    #[must_use]
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    #[must_use]
    pub fn with_max_connection_retry(mut self, max_connection_retry: Duration) -> Self {
        self.max_connection_retry = max_connection_retry;
        self
    }

    #[must_use]
    pub fn with_max_channels(mut self, max_channels: usize) -> Self {
        self.max_channels = max_channels;
        self
    }

    /// Sleep for `pull_interval` between empty polls instead of retrying immediately.
    #[must_use]
    pub fn with_pull_interval(mut self, pull_interval: Duration) -> Self {
        self.pull_interval = pull_interval;
        self
    }

    #[must_use]
    pub fn with_publisher_confirms(mut self, publisher_confirms: bool) -> Self {
        self.publisher_confirms = publisher_confirms;
        self
    }

    #[must_use]
    pub fn with_broker_options(mut self, broker: BrokerOptions) -> Self {
        self.broker = broker;
        self
    }
}

fn deserialize_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    deserialize_number_from_string(deserializer).map(Duration::from_secs)
}

fn deserialize_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    deserialize_number_from_string(deserializer).map(Duration::from_millis)
}
