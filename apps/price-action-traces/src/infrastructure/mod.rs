//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus process-wide bootstrap.

/// In-memory message bus.
pub mod bus;

/// JSON codec for price action payloads.
pub mod codec;

/// Configuration loaded from the environment.
pub mod config;

/// Random price action generator.
pub mod generator;

/// Kafka message bus adapter.
#[cfg(feature = "kafka")]
pub mod kafka;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// W3C trace context propagation over message headers.
pub mod propagation;

/// Binary start-up and shutdown helpers.
pub mod runtime;

/// OpenTelemetry tracing integration and units of work.
pub mod telemetry;
