//! Price Action Consumer Binary
//!
//! Consumes price actions from Kafka, continuing each producer trace, and
//! logs the rolling average of closing prices.
//!
//! Exits non-zero when the bus connection fails.
//!
//! # Usage
//!
//! ```bash
//! cargo run --features kafka --bin price-action-consumer
//! ```
//!
//! # Environment Variables
//!
//! - `KAFKA_BOOTSTRAP_SERVERS`: Bootstrap servers (default: application-kafka-bootstrap.kafka:9092)
//! - `ROLLING_AVERAGE_WINDOW`: Rolling average window (default: 5)
//! - `PRICE_ACTION_HISTORY_CAPACITY`: Records retained, 0 = unbounded (default: window)
//! - `CONSUMER_POLL_TIMEOUT_MS`: Poll wait (default: 100)
//! - `CONSUMER_MAX_BATCH`: Records per poll (default: 500)
//! - `METRICS_PORT`: Prometheus metrics port, 0 = disabled (default: 0)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: price-action-consumer)
//! - `RUST_LOG`: Log level (default: info)

use price_action_traces::infrastructure::kafka::KafkaSubscriber;
use price_action_traces::infrastructure::runtime::{await_shutdown, load_dotenv, log_config};
use price_action_traces::infrastructure::telemetry::{self, CONSUMER_SERVICE_NAME};
use price_action_traces::{AppConfig, PriceActionConsumer, init_metrics};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let telemetry_guard = telemetry::init(CONSUMER_SERVICE_NAME);

    tracing::info!("Starting price action consumer");

    let config = AppConfig::from_env()?;
    log_config(&config);
    init_metrics(config.metrics_port)?;

    let subscriber = KafkaSubscriber::connect(&config.bus, config.consumer.max_batch)?;

    let shutdown_token = CancellationToken::new();
    let signal_task = tokio::spawn(await_shutdown(shutdown_token.clone()));

    let mut consumer = PriceActionConsumer::new(
        subscriber,
        telemetry_guard.span_factory(),
        &config.consumer,
        config.bus.topic.clone(),
    );
    let result = consumer.run_until(&shutdown_token).await;

    signal_task.abort();
    result?;

    tracing::info!(
        appended = consumer.stats().appended,
        skipped = consumer.stats().failed,
        "Price action consumer stopped"
    );
    Ok(())
}
