//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `EventPublisherPort`: Hands encoded records to the bus
//! - `EventSubscriberPort`: Polls batches of records from the bus
//! - `PriceActionSource`: Supplies records to the producer

mod message_bus;
mod price_source;

pub use message_bus::{
    BusError, BusMessage, EventPublisherPort, EventSubscriberPort, Header, MessageHeaders,
};
#[cfg(test)]
pub use message_bus::MockEventPublisherPort;
pub use price_source::{FixedPriceSource, PriceActionSource};
