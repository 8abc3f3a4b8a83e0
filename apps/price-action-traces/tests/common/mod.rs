//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::NaiveDate;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use price_action_traces::{ConsumerSettings, PriceAction, Retention, SpanFactory, Underlying};

/// Span factory whose finished spans land in the returned exporter.
///
/// Hold the provider for the whole test: once the last tracer is gone the
/// provider shuts down and the exporter forgets its spans.
pub fn in_memory_spans() -> (SpanFactory, InMemorySpanExporter, SdkTracerProvider) {
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    (
        SpanFactory::new(provider.tracer("integration")),
        exporter,
        provider,
    )
}

/// Finished spans with the given name.
pub fn spans_named(exporter: &InMemorySpanExporter, name: &str) -> Vec<SpanData> {
    exporter
        .get_finished_spans()
        .unwrap()
        .into_iter()
        .filter(|span| span.name == name)
        .collect()
}

/// Consumer settings with a short poll and the given window.
pub fn consumer_settings(window: usize) -> ConsumerSettings {
    ConsumerSettings {
        window_size: NonZeroUsize::new(window).unwrap(),
        retention: Retention::from_capacity(window),
        poll_timeout: Duration::from_millis(20),
        max_batch: 100,
    }
}

/// Flat bar closing at `close`.
pub fn bar(symbol: &str, close: f64) -> PriceAction {
    let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(14, 0, 0)
        .unwrap();
    PriceAction::new(Underlying::new(symbol).unwrap(), ts, close, close, close, close)
        .with_volume(1000)
}
