//! Blox transport library
//! Client side of the Blox appliance's BLE command transport, with an HTTP
//! fallback for when the appliance is only reachable over the network.

// Module declarations
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod state;
pub mod utils;

pub use error::{Result, TransportError};
