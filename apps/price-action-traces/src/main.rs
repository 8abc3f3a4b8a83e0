//! Price Action Demo Binary
//!
//! Runs the producer and the consumer in one process over the in-memory bus.
//! Both sides share the tracer provider, so each record's send and processing
//! spans land in the same trace.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-action-demo
//! ```
//!
//! # Environment Variables
//!
//! - `ROLLING_AVERAGE_WINDOW`: Rolling average window (default: 5)
//! - `PRICE_ACTION_HISTORY_CAPACITY`: Records retained, 0 = unbounded (default: window)
//! - `CONSUMER_POLL_TIMEOUT_MS`: Poll wait (default: 100)
//! - `CONSUMER_MAX_BATCH`: Records per poll (default: 500)
//! - `PRODUCER_MESSAGE_COUNT`: Records to produce, 0 = until Ctrl+C (default: 10)
//! - `PRODUCER_INTERVAL_MS`: Pause between records (default: 1000)
//! - `METRICS_PORT`: Prometheus metrics port, 0 = disabled (default: 0)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: price-action-demo)
//! - `RUST_LOG`: Log level (default: info)

use std::time::Duration;

use price_action_traces::infrastructure::runtime::{await_shutdown, load_dotenv, log_config};
use price_action_traces::infrastructure::telemetry::{self, DEMO_SERVICE_NAME};
use price_action_traces::{
    AppConfig, InMemoryBus, PriceActionConsumer, PriceActionProducer, RandomPriceGenerator,
    init_metrics,
};
use tokio_util::sync::CancellationToken;

/// Longest wait for the consumer to catch up after the producer finishes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let telemetry_guard = telemetry::init(DEMO_SERVICE_NAME);

    tracing::info!("Starting price action demo");

    let config = AppConfig::from_env()?;
    log_config(&config);
    init_metrics(config.metrics_port)?;

    let shutdown_token = CancellationToken::new();
    let bus = InMemoryBus::new();
    let spans = telemetry_guard.span_factory();

    // Consumer side
    let subscriber = bus.subscriber().with_max_batch(config.consumer.max_batch);
    let mut consumer = PriceActionConsumer::new(
        subscriber,
        spans.clone(),
        &config.consumer,
        config.bus.topic.clone(),
    );
    let consumer_shutdown = shutdown_token.clone();
    let consumer_task = tokio::spawn(async move {
        let result = consumer.run_until(&consumer_shutdown).await;
        (result, consumer.stats(), consumer.rolling_average())
    });

    // Signal handling
    let signal_task = tokio::spawn(await_shutdown(shutdown_token.clone()));

    // Producer side
    let mut producer = PriceActionProducer::new(
        bus.publisher(),
        RandomPriceGenerator::new(),
        spans,
        config.bus.topic.clone(),
    );
    let produced = producer.run(&config.producer, &shutdown_token).await;

    // Let the consumer drain what was produced
    let topic = config.bus.topic.clone();
    let poll_timeout = config.consumer.poll_timeout;
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while bus.pending(&topic) > 0 && !shutdown_token.is_cancelled() {
            tokio::time::sleep(poll_timeout).await;
        }
    })
    .await
    .is_ok();
    if !drained {
        tracing::warn!(pending = bus.pending(&topic), "Consumer did not drain in time");
    }

    shutdown_token.cancel();
    let (result, consumed, rolling_average) = consumer_task.await?;
    signal_task.abort();
    result?;

    tracing::info!(
        sent = produced.sent,
        send_failures = produced.failed,
        appended = consumed.appended,
        skipped = consumed.failed,
        rolling_average = ?rolling_average,
        "Price action demo finished"
    );
    Ok(())
}
