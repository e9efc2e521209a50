//! Application state management
//! This module wires the concrete BLE and HTTP backends into one transport.

use std::sync::Arc;

use anyhow::Result;
use log::info;

use crate::config::TransportConfig;
use crate::core::BloxTransport;
use crate::core::bluetooth::BluestCentral;
use crate::core::http::HttpClient;

pub type AppTransport = BloxTransport<BluestCentral, HttpClient>;

/// Global application state
pub struct AppState {
    pub transport: Arc<AppTransport>,
    pub config: TransportConfig,
}

impl AppState {
    /// Creates a new AppState instance
    pub async fn new(config: TransportConfig) -> Result<Self> {
        info!("Initializing Bluetooth central...");
        let central = Arc::new(BluestCentral::new().await?);
        let http = HttpClient::new(config.http_base_url.clone(), config.http_timeout())?;
        let transport = BloxTransport::new(central, http, &config);
        Ok(Self {
            transport: Arc::new(transport),
            config,
        })
    }

    /// Gets a reference to the transport
    pub fn get_transport_arc(&self) -> Arc<AppTransport> {
        self.transport.clone()
    }
}
