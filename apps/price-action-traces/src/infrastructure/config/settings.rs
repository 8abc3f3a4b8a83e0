//! Application Configuration Settings
//!
//! Configuration types for the producer and consumer, loaded from environment
//! variables. Unparsable numeric values fall back to their defaults.

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::domain::history::Retention;
use crate::domain::rolling_average::DEFAULT_WINDOW_SIZE;

/// Topic price actions are published to.
pub const TOPIC: &str = "price-action";

/// Consumer group of the consumption loop.
pub const GROUP_ID: &str = "price-action-group";

/// Where a new consumer group starts reading.
pub const AUTO_OFFSET_RESET: &str = "earliest";

/// Default bus bootstrap address.
pub const DEFAULT_BOOTSTRAP_SERVERS: &str = "application-kafka-bootstrap.kafka:9092";

/// Message bus connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusSettings {
    /// Comma-separated bootstrap servers.
    pub bootstrap_servers: String,
    /// Topic to produce to and consume from.
    pub topic: String,
    /// Consumer group id.
    pub group_id: String,
    /// Offset reset policy for a new group.
    pub auto_offset_reset: String,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            bootstrap_servers: DEFAULT_BOOTSTRAP_SERVERS.to_string(),
            topic: TOPIC.to_string(),
            group_id: GROUP_ID.to_string(),
            auto_offset_reset: AUTO_OFFSET_RESET.to_string(),
        }
    }
}

/// Consumption loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Rolling average window `k`.
    pub window_size: NonZeroUsize,
    /// Records kept in the history.
    pub retention: Retention,
    /// Bounded wait of a single poll.
    pub poll_timeout: Duration,
    /// Maximum records returned by a single poll.
    pub max_batch: usize,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            retention: Retention::Bounded(DEFAULT_WINDOW_SIZE),
            poll_timeout: Duration::from_millis(100),
            max_batch: 500,
        }
    }
}

/// Production loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSettings {
    /// Records to produce (0 = unlimited).
    pub message_count: u64,
    /// Pause between records.
    pub interval: Duration,
    /// How long to wait for in-flight sends on exit.
    pub flush_timeout: Duration,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            message_count: 10,
            interval: Duration::from_secs(1),
            flush_timeout: Duration::from_secs(5),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppConfig {
    /// Bus connection settings.
    pub bus: BusSettings,
    /// Consumer settings.
    pub consumer: ConsumerSettings,
    /// Producer settings.
    pub producer: ProducerSettings,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl AppConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds a value outside its valid range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `KAFKA_BOOTSTRAP_SERVERS` is set but empty,
    /// `ROLLING_AVERAGE_WINDOW` is 0, or a non-zero
    /// `PRICE_ACTION_HISTORY_CAPACITY` cannot hold one window.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let bootstrap_servers = match env.get("KAFKA_BOOTSTRAP_SERVERS") {
            Some(v) if v.trim().is_empty() => {
                return Err(ConfigError::EmptyValue(
                    "KAFKA_BOOTSTRAP_SERVERS".to_string(),
                ));
            }
            Some(v) => v,
            None => DEFAULT_BOOTSTRAP_SERVERS.to_string(),
        };

        let window = env.parse_usize("ROLLING_AVERAGE_WINDOW", DEFAULT_WINDOW_SIZE.get());
        let window_size = NonZeroUsize::new(window).ok_or_else(|| ConfigError::InvalidValue {
            key: "ROLLING_AVERAGE_WINDOW".to_string(),
            reason: "window size must be at least 1".to_string(),
        })?;

        // History defaults to exactly one window and never holds less
        let capacity = env.parse_usize("PRICE_ACTION_HISTORY_CAPACITY", window);
        if capacity != 0 && capacity < window {
            return Err(ConfigError::InvalidValue {
                key: "PRICE_ACTION_HISTORY_CAPACITY".to_string(),
                reason: format!("capacity {capacity} is smaller than the window size {window}"),
            });
        }
        let retention = Retention::from_capacity(capacity);

        let consumer_defaults = ConsumerSettings::default();
        let consumer = ConsumerSettings {
            window_size,
            retention,
            poll_timeout: env
                .parse_duration_millis("CONSUMER_POLL_TIMEOUT_MS", consumer_defaults.poll_timeout),
            max_batch: env
                .parse_usize("CONSUMER_MAX_BATCH", consumer_defaults.max_batch)
                .max(1),
        };

        let producer_defaults = ProducerSettings::default();
        let producer = ProducerSettings {
            message_count: env.parse_u64("PRODUCER_MESSAGE_COUNT", producer_defaults.message_count),
            interval: env.parse_duration_millis("PRODUCER_INTERVAL_MS", producer_defaults.interval),
            flush_timeout: producer_defaults.flush_timeout,
        };

        Ok(Self {
            bus: BusSettings {
                bootstrap_servers,
                ..BusSettings::default()
            },
            consumer,
            producer,
            metrics_port: env.parse_u16("METRICS_PORT", 0),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable is outside its valid range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn parse_u16(&self, key: &str, default: u16) -> u16 {
        self.parse(key).unwrap_or(default)
    }

    fn parse_u64(&self, key: &str, default: u64) -> u64 {
        self.parse(key).unwrap_or(default)
    }

    fn parse_usize(&self, key: &str, default: usize) -> usize {
        self.parse(key).unwrap_or(default)
    }

    fn parse_duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_millis)
    }
}
