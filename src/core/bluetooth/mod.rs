//! Bluetooth functionality for the Blox transport
//! This module handles all bluetooth operations including scanning,
//! connecting, and exchanging commands with the Blox appliance.

mod adapter;
mod central;
mod channel;
mod commands;
mod connection;
mod constants;
mod notification;
mod reassembler;
mod scanner;
mod types;

// Re-export types that should be publicly accessible
pub use adapter::{BluestCentral, BluestLink};
pub use central::{BleCentral, DeviceSelector, GattLink, ScanStream, StatusCallback};
pub use channel::{CommandChannel, ExchangeState, PendingCommand};
pub use commands::BoxCommand;
pub use connection::{ConnectOptions, ConnectionManager};
pub use constants::*; // Re-export all constants
pub use notification::{NotificationStream, Subscription};
pub use reassembler::{DecodeOutcome, Frame, FrameError, ReassemblyBuffer, ResponseReassembler};
pub use scanner::{BluetoothScanner, TargetMatcher, strongest};
pub use types::{ApiResponse, ChannelPhase, ConnectionStatus, PeripheralHandle, Response};
