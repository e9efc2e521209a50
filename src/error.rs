//! Error types shared by the transport layers.

use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = TransportError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TransportError {
    /// A command is already outstanding on this channel.
    #[error("a command is already in progress")]
    CommandInProgress,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("no Blox device connected")]
    NotConnected,

    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("notifications unavailable on the command characteristic")]
    NotificationsUnavailable,

    /// Write or other GATT-level failure reported by the BLE stack.
    #[error("GATT error: {0}")]
    Gatt(String),

    /// The exchange was torn down by `cleanup()` before it settled.
    #[error("exchange cancelled")]
    Cancelled,

    #[error("device returned an empty response")]
    EmptyResponse,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP request returned status {0}")]
    HttpStatus(u16),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<bluest::Error> for TransportError {
    fn from(e: bluest::Error) -> Self {
        TransportError::Gatt(e.to_string())
    }
}
