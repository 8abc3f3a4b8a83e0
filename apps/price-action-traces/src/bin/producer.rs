//! Price Action Producer Binary
//!
//! Publishes random price actions to Kafka with W3C trace context in the
//! message headers.
//!
//! # Usage
//!
//! ```bash
//! cargo run --features kafka --bin price-action-producer
//! ```
//!
//! # Environment Variables
//!
//! - `KAFKA_BOOTSTRAP_SERVERS`: Bootstrap servers (default: application-kafka-bootstrap.kafka:9092)
//! - `PRODUCER_MESSAGE_COUNT`: Records to produce, 0 = until Ctrl+C (default: 10)
//! - `PRODUCER_INTERVAL_MS`: Pause between records (default: 1000)
//! - `METRICS_PORT`: Prometheus metrics port, 0 = disabled (default: 0)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: price-action-producer)
//! - `RUST_LOG`: Log level (default: info)

use price_action_traces::infrastructure::kafka::KafkaPublisher;
use price_action_traces::infrastructure::runtime::{await_shutdown, load_dotenv, log_config};
use price_action_traces::infrastructure::telemetry::{self, PRODUCER_SERVICE_NAME};
use price_action_traces::{AppConfig, PriceActionProducer, RandomPriceGenerator, init_metrics};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let telemetry_guard = telemetry::init(PRODUCER_SERVICE_NAME);

    tracing::info!("Starting price action producer");

    let config = AppConfig::from_env()?;
    log_config(&config);
    init_metrics(config.metrics_port)?;

    let publisher = KafkaPublisher::connect(&config.bus)?;

    let shutdown_token = CancellationToken::new();
    let signal_task = tokio::spawn(await_shutdown(shutdown_token.clone()));

    let mut producer = PriceActionProducer::new(
        publisher,
        RandomPriceGenerator::new(),
        telemetry_guard.span_factory(),
        config.bus.topic.clone(),
    );
    let stats = producer.run(&config.producer, &shutdown_token).await;

    signal_task.abort();
    tracing::info!(
        sent = stats.sent,
        failed = stats.failed,
        "Price action producer stopped"
    );
    Ok(())
}
