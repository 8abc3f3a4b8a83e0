//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `PriceActionProducer`: generates, traces and publishes price actions
//! - `PriceActionConsumer`: polls, traces and aggregates price actions

mod consumer;
mod producer;

pub use consumer::{
    ConsumerError, ConsumerState, ConsumerStats, PriceActionConsumer, ProcessError, RecordOutcome,
};
pub use producer::{PriceActionProducer, ProduceError, ProduceOutcome, ProducerStats};
