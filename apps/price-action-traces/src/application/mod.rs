//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the production and consumption services and the port
//! interfaces they drive.

/// Port interfaces for the message bus and price sources.
pub mod ports;

/// Production and consumption services.
pub mod services;
