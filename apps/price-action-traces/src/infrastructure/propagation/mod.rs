//! Trace Context Propagation
//!
//! Carries W3C trace context (`traceparent`, optional `tracestate`) across
//! the bus inside message headers.
//!
//! # Carrier Adapters
//!
//! The propagator only talks to OpenTelemetry's [`Injector`] (`set`) and
//! [`Extractor`] (`keys`, `get`) traits. Each envelope type implements them
//! once:
//!
//! - [`MessageHeaders`]: injection target and extraction source
//! - [`BusMessage`]: extraction source, delegating to its headers
//!
//! Duplicate header keys resolve to the last value.

use opentelemetry::Context;
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{SpanContext, TraceContextExt};
use opentelemetry_sdk::propagation::TraceContextPropagator;

use crate::application::ports::{BusMessage, MessageHeaders};

/// W3C `traceparent` header key.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// W3C `tracestate` header key.
pub const TRACESTATE_HEADER: &str = "tracestate";

// =============================================================================
// Carrier Adapters
// =============================================================================

impl Injector for MessageHeaders {
    fn set(&mut self, key: &str, value: String) {
        if key.is_empty() || value.is_empty() {
            return;
        }
        self.add(key, value.into_bytes());
    }
}

impl Extractor for MessageHeaders {
    fn get(&self, key: &str) -> Option<&str> {
        self.last_str(key)
    }

    fn keys(&self) -> Vec<&str> {
        Self::keys(self)
    }
}

impl Extractor for BusMessage {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.last_str(key)
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys()
    }
}

// =============================================================================
// Propagator
// =============================================================================

/// Injects and extracts W3C trace context through carrier adapters.
///
/// Never consults the process-wide current context: injection takes the
/// context explicitly and extraction starts from an empty one.
#[derive(Debug, Clone, Default)]
pub struct ContextPropagator {
    inner: TraceContextPropagator,
}

impl ContextPropagator {
    /// Create a W3C trace-context propagator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `cx`'s span identifiers into `carrier`.
    ///
    /// Does nothing when `cx` has no valid span.
    pub fn inject(&self, cx: &Context, carrier: &mut dyn Injector) {
        self.inner.inject_context(cx, carrier);
    }

    /// Read a parent context from `carrier`.
    ///
    /// With no valid propagation headers the result has no span, so units of
    /// work started under it become trace roots.
    #[must_use]
    pub fn extract(&self, carrier: &dyn Extractor) -> Context {
        self.inner.extract_with_context(&Context::new(), carrier)
    }

    /// Header keys this propagator reads and writes.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        self.inner.fields().map(ToString::to_string).collect()
    }
}

/// The remote span a context was extracted from, if any.
#[must_use]
pub fn remote_parent(cx: &Context) -> Option<SpanContext> {
    let span = cx.span();
    let span_context = span.span_context();
    (span_context.is_valid() && span_context.is_remote()).then(|| span_context.clone())
}
