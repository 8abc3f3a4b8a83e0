//! Price Action Producer
//!
//! One production cycle generates a record, opens a unit of work for the
//! send, injects that unit's trace context into fresh headers and hands the
//! encoded record to the bus keyed by its underlying.
//!
//! # Span Tree
//!
//! ```text
//! service.produce-price-action
//! ├── infrastructure.generate-price-action   {underlying, price}
//! └── infrastructure.send-price-action       {underlying}  <- injected
//! ```
//!
//! Encode and send failures never escape a cycle. They are logged, recorded
//! on the send span, counted, and reported through [`ProduceOutcome`].

use opentelemetry::KeyValue;
use opentelemetry::trace::{SpanKind, TraceId};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    BusError, BusMessage, EventPublisherPort, MessageHeaders, PriceActionSource,
};
use crate::domain::price_action::{PriceAction, Underlying};
use crate::infrastructure::codec::{CodecError, JsonCodec};
use crate::infrastructure::config::ProducerSettings;
use crate::infrastructure::metrics::{self, ProduceOutcomeLabel};
use crate::infrastructure::propagation::ContextPropagator;
use crate::infrastructure::telemetry::{SpanFactory, UnitOfWork};

/// Why a production cycle did not reach the bus.
#[derive(Debug, thiserror::Error)]
pub enum ProduceError {
    /// The record could not be encoded.
    #[error("encode failed: {0}")]
    Encode(#[from] CodecError),

    /// The bus rejected the message.
    #[error("send failed: {0}")]
    Send(#[from] BusError),
}

/// Result of one production cycle.
#[derive(Debug)]
pub enum ProduceOutcome {
    /// The record was handed to the bus.
    Sent {
        /// Instrument of the record.
        underlying: Underlying,
        /// Trace the send belongs to.
        trace_id: TraceId,
    },
    /// The cycle failed; the failure was logged and recorded.
    Failed {
        /// Instrument of the record.
        underlying: Underlying,
        /// Trace the failed send belongs to.
        trace_id: TraceId,
        /// What went wrong.
        error: ProduceError,
    },
}

impl ProduceOutcome {
    /// Whether the record reached the bus.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }

    /// Trace of the cycle.
    #[must_use]
    pub const fn trace_id(&self) -> TraceId {
        match self {
            Self::Sent { trace_id, .. } | Self::Failed { trace_id, .. } => *trace_id,
        }
    }
}

/// Running totals of a producer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Records handed to the bus.
    pub sent: u64,
    /// Cycles that failed.
    pub failed: u64,
}

/// Produces price actions to the bus with trace context attached.
pub struct PriceActionProducer<P, S> {
    publisher: P,
    source: S,
    spans: SpanFactory,
    codec: JsonCodec,
    propagator: ContextPropagator,
    topic: String,
    stats: ProducerStats,
}

impl<P, S> PriceActionProducer<P, S>
where
    P: EventPublisherPort,
    S: PriceActionSource,
{
    /// Create a producer publishing to `topic`.
    pub fn new(publisher: P, source: S, spans: SpanFactory, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            source,
            spans,
            codec: JsonCodec::new(),
            propagator: ContextPropagator::new(),
            topic: topic.into(),
            stats: ProducerStats::default(),
        }
    }

    /// Totals so far.
    #[must_use]
    pub const fn stats(&self) -> ProducerStats {
        self.stats
    }

    /// Run one production cycle.
    pub async fn produce_one(&mut self) -> ProduceOutcome {
        let cycle = self.spans.unit("service.produce-price-action").start();

        let action = {
            let generate = self
                .spans
                .unit("infrastructure.generate-price-action")
                .start_with_parent(cycle.context());
            let action = self.source.next_price_action();
            generate.set_attribute(KeyValue::new("underlying", action.underlying().to_string()));
            generate.set_attribute(KeyValue::new("price", action.close()));
            tracing::info!(underlying = %action.underlying(), "Generated price action");
            action
        };

        let send = self
            .spans
            .unit("infrastructure.send-price-action")
            .kind(SpanKind::Producer)
            .attribute(KeyValue::new("underlying", action.underlying().to_string()))
            .start_with_parent(cycle.context());
        let trace_id = send.trace_id();
        let underlying = action.underlying().clone();

        match self.send(&action, &send).await {
            Ok(()) => {
                tracing::info!(
                    underlying = %underlying,
                    trace_id = %trace_id,
                    "Sent price action"
                );
                metrics::record_produced(ProduceOutcomeLabel::Sent);
                self.stats.sent += 1;
                ProduceOutcome::Sent {
                    underlying,
                    trace_id,
                }
            }
            Err(error) => {
                send.record_failure(&error);
                tracing::error!(
                    underlying = %underlying,
                    trace_id = %trace_id,
                    error = %error,
                    "Failed to send price action"
                );
                metrics::record_produced(ProduceOutcomeLabel::Failed);
                self.stats.failed += 1;
                ProduceOutcome::Failed {
                    underlying,
                    trace_id,
                    error,
                }
            }
        }
    }

    async fn send(&self, action: &PriceAction, unit: &UnitOfWork) -> Result<(), ProduceError> {
        let payload = self.codec.encode(action)?;

        let mut headers = MessageHeaders::new();
        self.propagator.inject(unit.context(), &mut headers);

        let message = BusMessage::new(
            self.topic.clone(),
            Some(action.underlying().to_string()),
            payload,
            headers,
        );
        self.publisher.send(message).await?;
        Ok(())
    }

    /// Produce `settings.message_count` records (0 = until cancelled), pausing
    /// `settings.interval` between them, then flush the bus.
    pub async fn run(
        &mut self,
        settings: &ProducerSettings,
        shutdown: &CancellationToken,
    ) -> ProducerStats {
        let limit = (settings.message_count > 0).then_some(settings.message_count);
        let mut produced: u64 = 0;

        while !shutdown.is_cancelled() && limit.is_none_or(|n| produced < n) {
            self.produce_one().await;
            produced += 1;

            if limit.is_some_and(|n| produced >= n) {
                break;
            }

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(settings.interval) => {}
            }
        }

        if let Err(e) = self.publisher.flush(settings.flush_timeout).await {
            tracing::warn!(error = %e, "Flush did not complete");
        }

        tracing::info!(
            sent = self.stats.sent,
            failed = self.stats.failed,
            "Producer finished"
        );
        self.stats
    }
}

impl<P, S> std::fmt::Debug for PriceActionProducer<P, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceActionProducer")
            .field("topic", &self.topic)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{FixedPriceSource, MockEventPublisherPort};
    use crate::infrastructure::propagation::remote_parent;
    use crate::infrastructure::telemetry::test_support::in_memory_factory;
    use chrono::NaiveDate;
    use opentelemetry::trace::Status;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn source() -> FixedPriceSource {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        FixedPriceSource::new(vec![
            PriceAction::new(Underlying::new("AAPL").unwrap(), ts, 187.0, 190.0, 186.0, 188.5)
                .with_volume(12_000),
        ])
        .unwrap()
    }

    fn settings(count: u64) -> ProducerSettings {
        ProducerSettings {
            message_count: count,
            interval: Duration::from_millis(1),
            flush_timeout: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn sends_keyed_message_with_trace_headers() {
        let (spans, exporter) = in_memory_factory();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);

        let mut publisher = MockEventPublisherPort::new();
        publisher.expect_send().times(1).returning(move |message| {
            sink.lock().unwrap().push(message);
            Ok(())
        });

        let mut producer = PriceActionProducer::new(publisher, source(), spans, "price-action");
        let outcome = producer.produce_one().await;
        assert!(outcome.is_sent());

        let messages = captured.lock().unwrap();
        let message = &messages[0];
        assert_eq!(message.topic, "price-action");
        assert_eq!(message.key.as_deref(), Some("AAPL"));
        assert!(!message.payload.is_empty());

        let remote = remote_parent(&ContextPropagator::new().extract(message)).unwrap();
        assert_eq!(remote.trace_id(), outcome.trace_id());

        let finished = exporter.get_finished_spans().unwrap();
        let send = finished
            .iter()
            .find(|s| s.name == "infrastructure.send-price-action")
            .unwrap();
        assert_eq!(remote.span_id(), send.span_context.span_id());
        assert_eq!(send.span_kind, SpanKind::Producer);
    }

    #[tokio::test]
    async fn emits_span_tree_under_one_trace() {
        let (spans, exporter) = in_memory_factory();
        let mut publisher = MockEventPublisherPort::new();
        publisher.expect_send().returning(|_| Ok(()));

        let mut producer = PriceActionProducer::new(publisher, source(), spans, "price-action");
        let outcome = producer.produce_one().await;

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished.len(), 3);
        let root = finished
            .iter()
            .find(|s| s.name == "service.produce-price-action")
            .unwrap();
        for name in [
            "infrastructure.generate-price-action",
            "infrastructure.send-price-action",
        ] {
            let child = finished.iter().find(|s| s.name == name).unwrap();
            assert_eq!(child.parent_span_id, root.span_context.span_id());
            assert_eq!(child.span_context.trace_id(), outcome.trace_id());
        }

        let generate = finished
            .iter()
            .find(|s| s.name == "infrastructure.generate-price-action")
            .unwrap();
        assert!(generate.attributes.iter().any(|kv| kv.key.as_str() == "price"));
    }

    #[tokio::test]
    async fn send_failure_is_swallowed_and_recorded() {
        let (spans, exporter) = in_memory_factory();
        let mut publisher = MockEventPublisherPort::new();
        publisher.expect_send().returning(|_| {
            Err(BusError::Send {
                message: "queue full".into(),
            })
        });

        let mut producer = PriceActionProducer::new(publisher, source(), spans, "price-action");
        let outcome = producer.produce_one().await;

        assert!(matches!(
            outcome,
            ProduceOutcome::Failed {
                error: ProduceError::Send(_),
                ..
            }
        ));
        assert_eq!(producer.stats(), ProducerStats { sent: 0, failed: 1 });

        let finished = exporter.get_finished_spans().unwrap();
        let send = finished
            .iter()
            .find(|s| s.name == "infrastructure.send-price-action")
            .unwrap();
        assert!(matches!(send.status, Status::Error { .. }));
    }

    #[tokio::test]
    async fn run_stops_after_message_count_and_flushes() {
        let (spans, _exporter) = in_memory_factory();
        let mut publisher = MockEventPublisherPort::new();
        publisher.expect_send().times(3).returning(|_| Ok(()));
        publisher.expect_flush().times(1).returning(|_| Ok(()));

        let mut producer = PriceActionProducer::new(publisher, source(), spans, "price-action");
        let stats = producer.run(&settings(3), &CancellationToken::new()).await;

        assert_eq!(stats, ProducerStats { sent: 3, failed: 0 });
    }

    #[tokio::test]
    async fn run_continues_past_failures() {
        let (spans, _exporter) = in_memory_factory();
        let mut publisher = MockEventPublisherPort::new();
        let mut calls = 0;
        publisher.expect_send().times(3).returning(move |_| {
            calls += 1;
            if calls == 2 {
                Err(BusError::Send {
                    message: "timeout".into(),
                })
            } else {
                Ok(())
            }
        });
        publisher.expect_flush().returning(|_| Ok(()));

        let mut producer = PriceActionProducer::new(publisher, source(), spans, "price-action");
        let stats = producer.run(&settings(3), &CancellationToken::new()).await;

        assert_eq!(stats, ProducerStats { sent: 2, failed: 1 });
    }

    #[tokio::test]
    async fn cancelled_run_produces_nothing() {
        let (spans, _exporter) = in_memory_factory();
        let mut publisher = MockEventPublisherPort::new();
        publisher.expect_send().never();
        publisher.expect_flush().returning(|_| Ok(()));

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let mut producer = PriceActionProducer::new(publisher, source(), spans, "price-action");
        let stats = producer.run(&settings(0), &shutdown).await;

        assert_eq!(stats, ProducerStats::default());
    }
}
