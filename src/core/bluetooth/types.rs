//! Defines shared data structures for the Bluetooth module.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

static MAC_ADDRESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok());

/// A peripheral seen during discovery or found already connected.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PeripheralHandle {
    /// Platform-specific unique identifier for the device (especially important on macOS)
    pub id: String,
    /// The advertised name of the device, if available
    pub name: Option<String>,
    /// The MAC address, when the platform id carries one
    pub address: Option<String>,
    /// The signal strength (RSSI) at discovery time
    pub rssi: Option<i16>,
    /// When the advertisement was received
    pub discovered_at: DateTime<Utc>,
}

impl PeripheralHandle {
    pub fn new(id: String, name: Option<String>, rssi: Option<i16>) -> Self {
        let address = extract_mac_address(&id);
        Self {
            id,
            name,
            address,
            rssi,
            discovered_at: Utc::now(),
        }
    }
}

fn extract_mac_address(device_id: &str) -> Option<String> {
    MAC_ADDRESS
        .as_ref()?
        .find_iter(device_id)
        .last()
        .map(|m| m.as_str().to_uppercase())
}

/// Connection progress reported to callers for UI feedback.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Failed,
}

/// Observable phase of a command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    Idle,
    Awaiting,
    ReceivingChunks,
}

/// One logical response decoded from notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Text(String),
    Json(Value),
}

impl Response {
    pub fn is_empty(&self) -> bool {
        match self {
            Response::Text(text) => text.trim().is_empty(),
            Response::Json(Value::Null) => true,
            Response::Json(_) => false,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Response::Text(text) => Value::String(text),
            Response::Json(value) => value,
        }
    }
}

/// Transport-agnostic response shape, identical for BLE and HTTP.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApiResponse {
    pub data: Value,
}

impl From<Response> for ApiResponse {
    fn from(response: Response) -> Self {
        Self {
            data: response.into_value(),
        }
    }
}
