//! Prometheus Metrics Module
//!
//! Counters and gauges for the production and consumption loops.
//!
//! # Metrics
//!
//! - `price_action_produced_total{outcome}`: produce cycles by outcome
//! - `price_action_consumed_total{outcome}`: consumed records by outcome
//! - `price_action_poll_batch_size`: records returned per poll
//! - `price_action_rolling_average`: last computed average over the history
//! - `price_action_history_len`: records currently retained
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Start the Prometheus exporter on `0.0.0.0:port` and register metrics.
///
/// Port 0 leaves metrics disabled and returns `Ok(false)`.
///
/// # Errors
///
/// Returns an error if the exporter fails to start (e.g., port already in use).
pub fn init_metrics(port: u16) -> Result<bool, MetricsError> {
    if port == 0 {
        return Ok(false);
    }

    let listen_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    register_metrics();

    tracing::info!(addr = %listen_addr, "Prometheus metrics exporter started");
    Ok(true)
}

fn register_metrics() {
    describe_counter!(
        "price_action_produced_total",
        "Price action produce cycles by outcome"
    );
    describe_counter!(
        "price_action_consumed_total",
        "Consumed price action records by outcome"
    );
    describe_histogram!(
        "price_action_poll_batch_size",
        "Records returned by a single bus poll"
    );
    describe_gauge!(
        "price_action_rolling_average",
        "Most recent rolling average of close prices"
    );
    describe_gauge!(
        "price_action_history_len",
        "Price action records currently retained"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for a produce cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProduceOutcomeLabel {
    /// Record handed to the bus.
    Sent,
    /// Encoding or send failed.
    Failed,
}

impl ProduceOutcomeLabel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// Outcome label for a consumed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcomeLabel {
    /// Decoded and appended to the history.
    Appended,
    /// Payload could not be decoded.
    DecodeFailed,
}

impl ConsumeOutcomeLabel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Appended => "appended",
            Self::DecodeFailed => "decode_failed",
        }
    }
}

/// Record one produce cycle.
pub fn record_produced(outcome: ProduceOutcomeLabel) {
    counter!("price_action_produced_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record one consumed record.
pub fn record_consumed(outcome: ConsumeOutcomeLabel) {
    counter!("price_action_consumed_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record the size of a polled batch.
#[allow(clippy::cast_precision_loss)]
pub fn record_poll_batch(size: usize) {
    histogram!("price_action_poll_batch_size").record(size as f64);
}

/// Publish the latest rolling average. The history mixes instruments, so the
/// gauge carries no per-instrument label.
pub fn set_rolling_average(value: f64) {
    gauge!("price_action_rolling_average").set(value);
}

/// Publish the current history length.
#[allow(clippy::cast_precision_loss)]
pub fn set_history_len(len: usize) {
    gauge!("price_action_history_len").set(len as f64);
}

// =============================================================================
// Tests
// =============================================================================
