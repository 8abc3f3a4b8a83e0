//! Units of Work
//!
//! A [`UnitOfWork`] owns one started span together with the context that
//! carries it. Dropping the handle ends the span, so every exit path
//! (success, `?`, early `continue`) closes it exactly once.

use std::borrow::Cow;
use std::error::Error;

use opentelemetry::trace::{SpanContext, SpanKind, Status, TraceContextExt, TraceId, Tracer as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::SdkTracer;

/// Opens units of work on an injected tracer.
#[derive(Clone)]
pub struct SpanFactory {
    tracer: SdkTracer,
}

impl SpanFactory {
    /// Create a factory over `tracer`.
    #[must_use]
    pub const fn new(tracer: SdkTracer) -> Self {
        Self { tracer }
    }

    /// Begin describing a unit of work named `name`.
    #[must_use]
    pub fn unit(&self, name: impl Into<Cow<'static, str>>) -> UnitOfWorkBuilder<'_> {
        UnitOfWorkBuilder {
            tracer: &self.tracer,
            name: name.into(),
            kind: SpanKind::Internal,
            attributes: Vec::new(),
        }
    }
}

impl std::fmt::Debug for SpanFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanFactory").finish_non_exhaustive()
    }
}

/// Pending unit of work: name, kind and initial attributes.
#[must_use = "a unit of work does nothing until started"]
pub struct UnitOfWorkBuilder<'a> {
    tracer: &'a SdkTracer,
    name: Cow<'static, str>,
    kind: SpanKind,
    attributes: Vec<KeyValue>,
}

impl UnitOfWorkBuilder<'_> {
    /// Set the span kind (defaults to internal).
    pub fn kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add an attribute recorded at start.
    pub fn attribute(mut self, attribute: KeyValue) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Start as a trace root.
    pub fn start(self) -> UnitOfWork {
        self.start_with_parent(&Context::new())
    }

    /// Start as a child of the span in `parent`.
    ///
    /// A `parent` without a valid span yields a new root.
    pub fn start_with_parent(self, parent: &Context) -> UnitOfWork {
        let span = self
            .tracer
            .span_builder(self.name)
            .with_kind(self.kind)
            .with_attributes(self.attributes)
            .start_with_context(self.tracer, parent);
        UnitOfWork {
            cx: parent.with_span(span),
        }
    }
}

/// A started span; ended when dropped.
pub struct UnitOfWork {
    cx: Context,
}

impl UnitOfWork {
    /// Context carrying this span, used as a parent or for injection.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.cx
    }

    /// This span's identifiers.
    #[must_use]
    pub fn span_context(&self) -> SpanContext {
        self.cx.span().span_context().clone()
    }

    /// Trace this span belongs to.
    #[must_use]
    pub fn trace_id(&self) -> TraceId {
        self.cx.span().span_context().trace_id()
    }

    /// Record an attribute.
    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    /// Record a timestamped event.
    pub fn add_event(&self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        self.cx.span().add_event(name, attributes);
    }

    /// Record `error` and mark the span failed.
    pub fn record_failure(&self, error: &dyn Error) {
        let span = self.cx.span();
        span.record_error(error);
        span.set_status(Status::error(error.to_string()));
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let span = self.cx.span();
        let span_context = span.span_context();
        f.debug_struct("UnitOfWork")
            .field("trace_id", &span_context.trace_id())
            .field("span_id", &span_context.span_id())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::SpanFactory;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

    /// Factory whose spans land in the returned exporter when they end.
    pub(crate) fn in_memory_factory() -> (SpanFactory, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (SpanFactory::new(provider.tracer("test")), exporter)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::in_memory_factory;
    use super::*;
    use opentelemetry::trace::SpanId;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn span_ends_on_drop() {
        let (spans, exporter) = in_memory_factory();

        let unit = spans.unit("work").start();
        assert!(exporter.get_finished_spans().unwrap().is_empty());
        drop(unit);

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].name, "work");
    }

    #[test]
    fn root_has_no_parent() {
        let (spans, exporter) = in_memory_factory();
        drop(spans.unit("root").start());

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished[0].parent_span_id, SpanId::INVALID);
    }

    #[test]
    fn child_shares_trace_and_links_parent() {
        let (spans, exporter) = in_memory_factory();

        let parent = spans.unit("parent").start();
        let child = spans.unit("child").start_with_parent(parent.context());
        assert_eq!(child.trace_id(), parent.trace_id());
        let parent_span_id = parent.span_context().span_id();
        drop(child);
        drop(parent);

        let finished = exporter.get_finished_spans().unwrap();
        let child = finished.iter().find(|s| s.name == "child").unwrap();
        assert_eq!(child.parent_span_id, parent_span_id);
    }

    #[test]
    fn attributes_and_kind_are_recorded() {
        let (spans, exporter) = in_memory_factory();

        let unit = spans
            .unit("send")
            .kind(SpanKind::Producer)
            .attribute(KeyValue::new("underlying", "AAPL"))
            .start();
        unit.set_attribute(KeyValue::new("price", 187.5));
        drop(unit);

        let finished = exporter.get_finished_spans().unwrap();
        let span = &finished[0];
        assert_eq!(span.span_kind, SpanKind::Producer);
        assert!(
            span.attributes
                .iter()
                .any(|kv| kv.key.as_str() == "underlying" && kv.value.as_str() == "AAPL")
        );
        assert!(span.attributes.iter().any(|kv| kv.key.as_str() == "price"));
    }

    #[test]
    fn failure_sets_error_status() {
        let (spans, exporter) = in_memory_factory();

        let unit = spans.unit("fails").start();
        unit.record_failure(&Boom);
        drop(unit);

        let finished = exporter.get_finished_spans().unwrap();
        assert!(matches!(finished[0].status, Status::Error { .. }));
    }
}
