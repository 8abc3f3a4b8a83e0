//! Configuration Module
//!
//! Environment-driven configuration for the producer and consumer binaries.

mod settings;

pub use settings::{
    AUTO_OFFSET_RESET, AppConfig, BusSettings, ConfigError, ConsumerSettings,
    DEFAULT_BOOTSTRAP_SERVERS, GROUP_ID, ProducerSettings, TOPIC,
};
