//! Price Action Consumer
//!
//! Consumption loop: poll a batch, then process every record on its own:
//!
//! ```text
//! extract parent -> start record unit -> decode -> append -> recompute average -> end unit
//! ```
//!
//! # States
//!
//! ```text
//! Idle -> Polling -> Processing -> Polling -> ... -> Terminated
//! ```
//!
//! A record that fails to decode is recorded on its unit of work, logged and
//! skipped. Only a fatal bus error ends the loop, which is the single path to
//! [`ConsumerState::Terminated`]. A cancellation token stops the loop between
//! polls.
//!
//! # Span Tree
//!
//! ```text
//! start-consuming-price-actions                        (loop lifetime)
//! <producer's send span>
//! └── process-price-action-record   {offset, partition, underlying}
//!     └── calculate-rolling-average {windowSize, rolling_average}
//! ```

use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::trace::{SpanKind, TraceId};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BusError, BusMessage, EventSubscriberPort};
use crate::domain::history::PriceActionHistory;
use crate::domain::price_action::Underlying;
use crate::domain::rolling_average::RollingAverage;
use crate::infrastructure::codec::{CodecError, JsonCodec};
use crate::infrastructure::config::ConsumerSettings;
use crate::infrastructure::metrics::{self, ConsumeOutcomeLabel};
use crate::infrastructure::propagation::ContextPropagator;
use crate::infrastructure::telemetry::SpanFactory;

/// Where the consumption loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Not yet polling.
    Idle,
    /// Waiting on the bus.
    Polling,
    /// Working through a polled batch.
    Processing,
    /// Stopped by a fatal bus error.
    Terminated,
}

/// Fatal consumer error.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    /// The bus failed; the loop cannot continue.
    #[error("message bus failure: {0}")]
    Bus(#[from] BusError),
}

/// Per-record processing error. Never ends the loop.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Payload could not be decoded.
    #[error("failed to decode price action: {0}")]
    Decode(#[from] CodecError),
}

/// Result of processing one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    /// Instrument of the record.
    pub underlying: Underlying,
    /// Trace the record unit of work belongs to.
    pub trace_id: TraceId,
    /// Average after appending, `None` while the window is not full.
    pub rolling_average: Option<f64>,
}

/// Running totals of a consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Completed polls.
    pub polls: u64,
    /// Records appended to the history.
    pub appended: u64,
    /// Records skipped because they failed to process.
    pub failed: u64,
}

/// Consumes price actions and maintains the rolling average.
pub struct PriceActionConsumer<S> {
    subscriber: S,
    spans: SpanFactory,
    codec: JsonCodec,
    propagator: ContextPropagator,
    history: PriceActionHistory,
    average: RollingAverage,
    topic: String,
    poll_timeout: Duration,
    state: ConsumerState,
    stats: ConsumerStats,
}

impl<S: EventSubscriberPort> PriceActionConsumer<S> {
    /// Create a consumer reading `topic`.
    pub fn new(
        subscriber: S,
        spans: SpanFactory,
        settings: &ConsumerSettings,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            subscriber,
            spans,
            codec: JsonCodec::new(),
            propagator: ContextPropagator::new(),
            history: PriceActionHistory::new(settings.retention),
            average: RollingAverage::new(settings.window_size),
            topic: topic.into(),
            poll_timeout: settings.poll_timeout,
            state: ConsumerState::Idle,
            stats: ConsumerStats::default(),
        }
    }

    /// Current loop state.
    #[must_use]
    pub const fn state(&self) -> ConsumerState {
        self.state
    }

    /// Totals so far.
    #[must_use]
    pub const fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Records currently retained.
    #[must_use]
    pub const fn history(&self) -> &PriceActionHistory {
        &self.history
    }

    /// Average over the current history.
    #[must_use]
    pub fn rolling_average(&self) -> Option<f64> {
        self.average.compute(&self.history)
    }

    /// Subscribe to the configured topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus rejects the subscription.
    pub async fn subscribe(&mut self) -> Result<(), ConsumerError> {
        if let Err(e) = self.subscriber.subscribe(&self.topic).await {
            self.state = ConsumerState::Terminated;
            return Err(e.into());
        }
        tracing::info!(topic = %self.topic, "Subscribed");
        Ok(())
    }

    /// Poll once and process the batch. Returns the batch size.
    ///
    /// # Errors
    ///
    /// Returns an error, and moves to [`ConsumerState::Terminated`], when the
    /// poll fails. Record failures are not errors.
    pub async fn poll_once(&mut self) -> Result<usize, ConsumerError> {
        self.state = ConsumerState::Polling;
        let batch = match self.subscriber.poll(self.poll_timeout).await {
            Ok(batch) => batch,
            Err(e) => {
                self.state = ConsumerState::Terminated;
                return Err(e.into());
            }
        };
        self.stats.polls += 1;
        metrics::record_poll_batch(batch.len());

        if !batch.is_empty() {
            self.state = ConsumerState::Processing;
            for message in &batch {
                // Failures are already recorded and logged; keep going
                let _ = self.process_message(message);
            }
            self.state = ConsumerState::Polling;
        }
        Ok(batch.len())
    }

    /// Process a single record under its own unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be decoded. The history is left
    /// untouched in that case.
    pub fn process_message(&mut self, message: &BusMessage) -> Result<RecordOutcome, ProcessError> {
        let parent = self.propagator.extract(message);

        let mut builder = self
            .spans
            .unit("process-price-action-record")
            .kind(SpanKind::Consumer);
        if let Some(offset) = message.offset {
            builder = builder.attribute(KeyValue::new("offset", offset));
        }
        if let Some(partition) = message.partition {
            builder = builder.attribute(KeyValue::new("partition", i64::from(partition)));
        }
        let unit = builder.start_with_parent(&parent);
        let trace_id = unit.trace_id();

        let action = match self.codec.decode(&message.payload) {
            Ok(action) => action,
            Err(e) => {
                let error = ProcessError::from(e);
                unit.record_failure(&error);
                tracing::error!(
                    offset = ?message.offset,
                    trace_id = %trace_id,
                    error = %error,
                    "Error processing record"
                );
                metrics::record_consumed(ConsumeOutcomeLabel::DecodeFailed);
                self.stats.failed += 1;
                return Err(error);
            }
        };

        let underlying = action.underlying().clone();
        unit.set_attribute(KeyValue::new("underlying", underlying.to_string()));
        self.history.append(action);
        self.stats.appended += 1;
        metrics::record_consumed(ConsumeOutcomeLabel::Appended);
        metrics::set_history_len(self.history.len());

        let rolling_average = {
            let window = i64::try_from(self.average.window_size()).unwrap_or(i64::MAX);
            let calculate = self
                .spans
                .unit("calculate-rolling-average")
                .attribute(KeyValue::new("windowSize", window))
                .start_with_parent(unit.context());
            let average = self.average.compute(&self.history);
            if let Some(value) = average {
                calculate.set_attribute(KeyValue::new("rolling_average", value));
                metrics::set_rolling_average(value);
            }
            average
        };

        match rolling_average {
            Some(value) => tracing::info!(
                underlying = %underlying,
                offset = ?message.offset,
                trace_id = %trace_id,
                rolling_average = value,
                "Processed price action"
            ),
            None => tracing::info!(
                underlying = %underlying,
                offset = ?message.offset,
                trace_id = %trace_id,
                retained = self.history.len(),
                window = self.average.window_size(),
                "Processed price action, rolling average not yet available"
            ),
        }

        Ok(RecordOutcome {
            underlying,
            trace_id,
            rolling_average,
        })
    }

    /// Subscribe and consume until the bus fails.
    ///
    /// # Errors
    ///
    /// Returns the fatal bus error that terminated the loop.
    pub async fn run(&mut self) -> Result<(), ConsumerError> {
        self.run_until(&CancellationToken::new()).await
    }

    /// Subscribe and consume until the bus fails or `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the fatal bus error that terminated the loop.
    pub async fn run_until(&mut self, shutdown: &CancellationToken) -> Result<(), ConsumerError> {
        let lifetime = self.spans.unit("start-consuming-price-actions").start();

        let result = self.consume(shutdown).await;
        if let Err(e) = &result {
            lifetime.record_failure(e);
            tracing::error!(error = %e, "Error in consumer loop");
        } else {
            self.state = ConsumerState::Idle;
            tracing::info!(
                appended = self.stats.appended,
                failed = self.stats.failed,
                "Consumer stopped"
            );
        }
        result
    }

    async fn consume(&mut self, shutdown: &CancellationToken) -> Result<(), ConsumerError> {
        self.subscribe().await?;
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Ok(()),
                result = self.poll_once() => { result?; }
            }
        }
    }
}

impl<S> std::fmt::Debug for PriceActionConsumer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceActionConsumer")
            .field("topic", &self.topic)
            .field("state", &self.state)
            .field("retained", &self.history.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MessageHeaders;
    use crate::domain::history::Retention;
    use crate::domain::price_action::PriceAction;
    use crate::infrastructure::propagation::TRACEPARENT_HEADER;
    use crate::infrastructure::telemetry::test_support::in_memory_factory;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use opentelemetry::trace::{SpanId, Status};
    use std::collections::VecDeque;
    use std::num::NonZeroUsize;

    /// Replays scripted poll results, then fails like a dropped connection.
    struct ScriptedSubscriber {
        polls: VecDeque<Result<Vec<BusMessage>, BusError>>,
    }

    #[async_trait]
    impl EventSubscriberPort for ScriptedSubscriber {
        async fn subscribe(&mut self, _topic: &str) -> Result<(), BusError> {
            Ok(())
        }

        async fn poll(&mut self, _timeout: Duration) -> Result<Vec<BusMessage>, BusError> {
            self.polls.pop_front().unwrap_or(Err(BusError::Connection {
                message: "connection reset".into(),
            }))
        }
    }

    fn settings(window: usize) -> ConsumerSettings {
        ConsumerSettings {
            window_size: NonZeroUsize::new(window).unwrap(),
            retention: Retention::from_capacity(window),
            poll_timeout: Duration::from_millis(1),
            max_batch: 100,
        }
    }

    fn record(close: f64, offset: i64) -> BusMessage {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let action = PriceAction::new(Underlying::new("TSLA").unwrap(), ts, close, close, close, close);
        let payload = JsonCodec::new().encode(&action).unwrap();
        BusMessage::new("price-action", Some("TSLA".into()), payload, MessageHeaders::new())
            .with_position(0, offset)
    }

    fn garbage(offset: i64) -> BusMessage {
        BusMessage::new("price-action", None, b"{oops".to_vec(), MessageHeaders::new())
            .with_position(0, offset)
    }

    fn consumer(
        polls: Vec<Result<Vec<BusMessage>, BusError>>,
        window: usize,
    ) -> (
        PriceActionConsumer<ScriptedSubscriber>,
        opentelemetry_sdk::trace::InMemorySpanExporter,
    ) {
        let (spans, exporter) = in_memory_factory();
        let subscriber = ScriptedSubscriber {
            polls: polls.into(),
        };
        (
            PriceActionConsumer::new(subscriber, spans, &settings(window), "price-action"),
            exporter,
        )
    }

    #[tokio::test]
    async fn malformed_record_is_skipped_and_loop_continues() {
        let batch = vec![record(1.0, 0), record(2.0, 1), garbage(2), record(3.0, 3)];
        let (mut consumer, exporter) = consumer(vec![Ok(batch), Ok(vec![record(4.0, 4)])], 5);
        consumer.subscribe().await.unwrap();

        assert_eq!(consumer.poll_once().await.unwrap(), 4);
        assert_eq!(consumer.history().len(), 3);
        assert_eq!(consumer.poll_once().await.unwrap(), 1);

        assert_eq!(
            consumer.stats(),
            ConsumerStats {
                polls: 2,
                appended: 4,
                failed: 1
            }
        );
        assert_eq!(consumer.state(), ConsumerState::Polling);

        let finished = exporter.get_finished_spans().unwrap();
        let failed: Vec<_> = finished
            .iter()
            .filter(|s| matches!(s.status, Status::Error { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "process-price-action-record");
        assert!(
            failed[0]
                .attributes
                .iter()
                .any(|kv| kv.key.as_str() == "offset" && kv.value == opentelemetry::Value::I64(2))
        );
    }

    #[tokio::test]
    async fn average_unavailable_until_window_fills() {
        let (mut consumer, _exporter) = consumer(vec![], 3);

        assert_eq!(
            consumer.process_message(&record(1.0, 0)).unwrap().rolling_average,
            None
        );
        assert_eq!(
            consumer.process_message(&record(2.0, 1)).unwrap().rolling_average,
            None
        );
        assert_eq!(
            consumer.process_message(&record(3.0, 2)).unwrap().rolling_average,
            Some(2.0)
        );
        assert_eq!(
            consumer.process_message(&record(6.0, 3)).unwrap().rolling_average,
            Some(11.0 / 3.0)
        );
        assert_eq!(consumer.history().len(), 3);
    }

    #[tokio::test]
    async fn record_without_headers_starts_root_trace() {
        let (mut consumer, exporter) = consumer(vec![], 5);
        consumer.process_message(&record(10.0, 0)).unwrap();

        let finished = exporter.get_finished_spans().unwrap();
        let span = finished
            .iter()
            .find(|s| s.name == "process-price-action-record")
            .unwrap();
        assert_eq!(span.parent_span_id, SpanId::INVALID);
        assert_eq!(span.span_kind, SpanKind::Consumer);
    }

    #[tokio::test]
    async fn record_joins_producer_trace() {
        let (mut consumer, exporter) = consumer(vec![], 1);
        let mut message = record(10.0, 0);
        message.headers.add(
            TRACEPARENT_HEADER,
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        );

        let outcome = consumer.process_message(&message).unwrap();
        assert_eq!(
            outcome.trace_id,
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap()
        );

        let finished = exporter.get_finished_spans().unwrap();
        let record_span = finished
            .iter()
            .find(|s| s.name == "process-price-action-record")
            .unwrap();
        assert_eq!(
            record_span.parent_span_id,
            SpanId::from_hex("00f067aa0ba902b7").unwrap()
        );

        let calculate = finished
            .iter()
            .find(|s| s.name == "calculate-rolling-average")
            .unwrap();
        assert_eq!(
            calculate.parent_span_id,
            record_span.span_context.span_id()
        );
        assert!(
            calculate
                .attributes
                .iter()
                .any(|kv| kv.key.as_str() == "windowSize" && kv.value == opentelemetry::Value::I64(1))
        );
    }

    #[tokio::test]
    async fn fatal_poll_terminates_loop() {
        let (mut consumer, exporter) = consumer(vec![Ok(vec![record(1.0, 0)]), Ok(vec![])], 5);

        let err = consumer.run().await.unwrap_err();
        assert!(matches!(err, ConsumerError::Bus(BusError::Connection { .. })));
        assert_eq!(consumer.state(), ConsumerState::Terminated);
        assert_eq!(consumer.stats().appended, 1);

        let finished = exporter.get_finished_spans().unwrap();
        let lifetime = finished
            .iter()
            .find(|s| s.name == "start-consuming-price-actions")
            .unwrap();
        assert!(matches!(lifetime.status, Status::Error { .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_cleanly() {
        let (mut consumer, _exporter) = consumer(vec![], 5);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        consumer.run_until(&shutdown).await.unwrap();
        assert_eq!(consumer.state(), ConsumerState::Idle);
        assert_eq!(consumer.stats().polls, 0);
    }
}
