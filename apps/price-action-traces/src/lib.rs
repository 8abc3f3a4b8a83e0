#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_precision_loss
    )
)]

//! Price Action Traces - Traced Price Action Pipeline
//!
//! Produces price action records onto a message bus and consumes them into a
//! trailing rolling average of closing prices. W3C trace context travels in
//! message headers, so a record's production and consumption form one
//! distributed trace across two processes.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Records and the aggregation over them
//!   - `price_action`: Price action record and instrument symbol
//!   - `history`: Arrival-ordered record store with retention
//!   - `rolling_average`: Trailing mean of close prices
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Bus publisher/subscriber, price sources
//!   - `services`: Producer and consumer loops
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `bus`: In-memory message bus
//!   - `kafka`: Kafka message bus (feature `kafka`)
//!   - `codec`: JSON payloads
//!   - `propagation`: Trace context in message headers
//!   - `telemetry`: Tracing bootstrap and units of work
//!   - `generator`: Random price actions
//!   - `config`, `metrics`, `runtime`: Ambient plumbing
//!
//! # Data Flow
//!
//! ```text
//! generator -> producer --(payload + traceparent)--> bus --> consumer -> history -> average
//!                 |                                              |
//!                 +------------------ one trace -----------------+
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Records and aggregation with no bus or tracing knowledge.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::history::{PriceActionHistory, Retention};
pub use domain::price_action::{DomainError, PriceAction, Underlying};
pub use domain::rolling_average::{DEFAULT_WINDOW_SIZE, RollingAverage};

// Ports
pub use application::ports::{
    BusError, BusMessage, EventPublisherPort, EventSubscriberPort, FixedPriceSource,
    MessageHeaders, PriceActionSource,
};

// Services
pub use application::services::{
    ConsumerError, ConsumerState, ConsumerStats, PriceActionConsumer, PriceActionProducer,
    ProcessError, ProduceError, ProduceOutcome, ProducerStats, RecordOutcome,
};

// Adapters
pub use infrastructure::bus::{InMemoryBus, InMemoryPublisher, InMemorySubscriber};
pub use infrastructure::codec::{CodecError, JsonCodec};
pub use infrastructure::generator::RandomPriceGenerator;
pub use infrastructure::propagation::ContextPropagator;

// Infrastructure config
pub use infrastructure::config::{
    AppConfig, BusSettings, ConfigError, ConsumerSettings, ProducerSettings, TOPIC,
};

// Metrics
pub use infrastructure::metrics::{MetricsError, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{
    SpanFactory, TelemetryConfig, TelemetryGuard, UnitOfWork, init as init_telemetry,
};
