//! Core functionality for the Blox transport
//! BLE command exchange, the HTTP fallback, and the façade choosing between them

pub mod bluetooth;
pub mod http;
pub mod transport;

// Re-export commonly used types
pub use http::{HttpApi, HttpClient};
pub use transport::BloxTransport;
