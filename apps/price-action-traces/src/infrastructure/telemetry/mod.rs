//! OpenTelemetry Tracing Integration
//!
//! Bootstraps the process-wide `tracing` subscriber and the OpenTelemetry
//! tracer provider, and hands out the [`SpanFactory`] that components use to
//! open units of work.
//!
//! # Environment Variables
//!
//! - `OTEL_ENABLED`: Set to "false" to disable export (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP gRPC endpoint (default: http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: Service name for traces (default: per binary)
//!
//! # Usage
//!
//! ```ignore
//! use price_action_traces::infrastructure::telemetry;
//!
//! // Initialize at startup (returns guard that must be kept alive)
//! let guard = telemetry::init(telemetry::CONSUMER_SERVICE_NAME);
//!
//! // Inject the span factory into components
//! let spans = guard.span_factory();
//! ```
//!
//! Export being disabled only drops the exporter. A tracer provider is always
//! built, so trace and span ids are still generated and propagated.

mod unit_of_work;

pub use unit_of_work::{SpanFactory, UnitOfWork, UnitOfWorkBuilder};
#[cfg(test)]
pub(crate) use unit_of_work::test_support;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default service name of the producer binary.
pub const PRODUCER_SERVICE_NAME: &str = "price-action-producer";

/// Default service name of the consumer binary.
pub const CONSUMER_SERVICE_NAME: &str = "price-action-consumer";

/// Default service name of the single-process demo.
pub const DEMO_SERVICE_NAME: &str = "price-action-demo";

/// Default OTLP endpoint.
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Guard that shuts down OpenTelemetry when dropped.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
    service_name: String,
}

impl TelemetryGuard {
    /// Wrap an already-built provider.
    ///
    /// Used when the caller owns exporter selection, e.g. an in-memory
    /// exporter in tests.
    #[must_use]
    pub fn from_provider(provider: SdkTracerProvider, service_name: impl Into<String>) -> Self {
        Self {
            tracer_provider: Some(provider),
            service_name: service_name.into(),
        }
    }

    /// Span factory backed by this guard's provider.
    #[must_use]
    pub fn span_factory(&self) -> SpanFactory {
        let tracer = match &self.tracer_provider {
            Some(provider) => provider.tracer(self.service_name.clone()),
            None => SdkTracerProvider::builder()
                .build()
                .tracer(self.service_name.clone()),
        };
        SpanFactory::new(tracer)
    }

    /// Service name traces are reported under.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shutdown OpenTelemetry tracer provider: {e}");
        }
    }
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("service_name", &self.service_name)
            .field("active", &self.tracer_provider.is_some())
            .finish()
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Whether spans are exported over OTLP.
    pub enabled: bool,
    /// OTLP exporter endpoint.
    pub otlp_endpoint: String,
    /// Service name for traces.
    pub service_name: String,
}

impl TelemetryConfig {
    /// Configuration with defaults for the given service.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            enabled: true,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            service_name: service_name.into(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// `default_service_name` applies when `OTEL_SERVICE_NAME` is unset.
    #[must_use]
    pub fn from_env(default_service_name: &str) -> Self {
        Self::from_lookup(default_service_name, |key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup<F>(default_service_name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = lookup("OTEL_ENABLED").is_none_or(|v| v.to_lowercase() != "false");

        let otlp_endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string());

        let service_name =
            lookup("OTEL_SERVICE_NAME").unwrap_or_else(|| default_service_name.to_string());

        Self {
            enabled,
            otlp_endpoint,
            service_name,
        }
    }
}

/// Initialize telemetry from environment for the given service.
///
/// Returns a guard that must be kept alive for the duration of the program.
/// When the guard is dropped, OpenTelemetry will be properly shut down.
#[must_use]
pub fn init(default_service_name: &str) -> TelemetryGuard {
    init_with_config(TelemetryConfig::from_env(default_service_name))
}

/// Initialize telemetry with custom configuration.
///
/// Falls back to console-only logging when the OTLP exporter cannot be
/// created. Must be called at most once per process.
#[must_use]
#[allow(clippy::expect_used)]
pub fn init_with_config(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::from_default_env()
        .add_directive(
            "price_action_traces=info"
                .parse()
                .expect("static directive 'price_action_traces=info' is valid"),
        )
        .add_directive(
            "rdkafka=info"
                .parse()
                .expect("static directive 'rdkafka=info' is valid"),
        )
        .add_directive(
            "h2=warn"
                .parse()
                .expect("static directive 'h2=warn' is valid"),
        )
        .add_directive(
            "tonic=warn"
                .parse()
                .expect("static directive 'tonic=warn' is valid"),
        );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .build();

    let exporter = if config.enabled {
        match opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&config.otlp_endpoint)
            .build()
        {
            Ok(exporter) => Some(exporter),
            Err(e) => {
                eprintln!("Failed to create OTLP exporter, continuing without export: {e}");
                None
            }
        }
    } else {
        None
    };

    let exporting = exporter.is_some();
    let tracer_provider = match exporter {
        Some(exporter) => SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build(),
        None => SdkTracerProvider::builder().with_resource(resource).build(),
    };

    // Bridge `tracing` spans into the same provider
    let tracer = tracer_provider.tracer(config.service_name.clone());
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    if exporting {
        tracing::info!(
            endpoint = %config.otlp_endpoint,
            service = %config.service_name,
            "OTLP span export enabled"
        );
    } else {
        tracing::info!(service = %config.service_name, "OTLP span export disabled");
    }

    TelemetryGuard::from_provider(tracer_provider, config.service_name)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config() {
        let config = TelemetryConfig::new(PRODUCER_SERVICE_NAME);
        assert!(config.enabled);
        assert_eq!(config.otlp_endpoint, DEFAULT_OTLP_ENDPOINT);
        assert_eq!(config.service_name, "price-action-producer");
    }

    #[test]
    fn lookup_uses_binary_default_service_name() {
        let config = TelemetryConfig::from_lookup(CONSUMER_SERVICE_NAME, lookup_from(&[]));
        assert!(config.enabled);
        assert_eq!(config.service_name, "price-action-consumer");
    }

    #[test]
    fn lookup_honors_overrides() {
        let config = TelemetryConfig::from_lookup(
            DEMO_SERVICE_NAME,
            lookup_from(&[
                ("OTEL_ENABLED", "FALSE"),
                ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4317"),
                ("OTEL_SERVICE_NAME", "custom"),
            ]),
        );
        assert!(!config.enabled);
        assert_eq!(config.otlp_endpoint, "http://collector:4317");
        assert_eq!(config.service_name, "custom");
    }

    #[test]
    fn guard_hands_out_working_factory() {
        let guard = TelemetryGuard::from_provider(SdkTracerProvider::builder().build(), "test");
        let unit = guard.span_factory().unit("probe").start();
        assert!(unit.span_context().is_valid());
        assert_eq!(guard.service_name(), "test");
    }
}
