//! Single entry point used by feature code to talk to the appliance.
//!
//! BLE is an opportunistic fast path: operations that have an HTTP
//! counterpart try BLE first when the appliance is connected and fall back
//! to HTTP on any BLE failure. Only HTTP errors reach the caller.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::TransportConfig;
use crate::core::bluetooth::{
    ApiResponse, BleCentral, BoxCommand, CommandChannel, ConnectOptions, ConnectionManager,
    Response,
};
use crate::core::http::HttpApi;
use crate::error::{Result, TransportError};

pub struct BloxTransport<C: BleCentral, H: HttpApi> {
    connection: ConnectionManager<C>,
    http: H,
    command_timeout: Duration,
    /// Channel bound to the connected appliance, keyed by peripheral id
    channel: Mutex<Option<(String, Arc<CommandChannel>)>>,
}

impl<C: BleCentral, H: HttpApi> BloxTransport<C, H> {
    pub fn new(central: Arc<C>, http: H, config: &TransportConfig) -> Self {
        Self {
            connection: ConnectionManager::new(central, config),
            http,
            command_timeout: config.command_timeout(),
            channel: Mutex::new(None),
        }
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    pub async fn connect(&self, options: &ConnectOptions) -> bool {
        self.connection.connect(options).await
    }

    /// Send a raw command over BLE and wait for its response. Errors are
    /// not suppressed here.
    pub async fn write_and_wait_for_response(&self, command: &str) -> Result<Response> {
        let channel = self.command_channel().await?;
        let result = channel
            .write_and_wait_for_response(command, self.command_timeout)
            .await;
        if let Err(TransportError::Gatt(e)) = &result {
            warn!("Dropping command link after GATT error: {}", e);
            self.evict(&channel).await;
        }
        result
    }

    /// Tear down the current exchange and its notification subscription.
    pub async fn cleanup(&self) {
        if let Some((_, channel)) = &*self.channel.lock().await {
            channel.cleanup();
        }
    }

    pub async fn disconnect(&self) -> Result<()> {
        if let Some((_, channel)) = self.channel.lock().await.take() {
            channel.cleanup();
        }
        self.connection.disconnect().await
    }

    pub async fn get_wifi_list(&self) -> Result<ApiResponse> {
        if let Some(response) = self.try_ble(&BoxCommand::WifiList).await {
            return Ok(response);
        }
        self.http.get_wifi_list().await
    }

    pub async fn get_wifi_status(&self) -> Result<ApiResponse> {
        if let Some(response) = self.try_ble(&BoxCommand::WifiStatus).await {
            return Ok(response);
        }
        self.http.get_wifi_status().await
    }

    pub async fn connect_wifi(&self, ssid: &str, password: &str, country_code: &str) -> Result<ApiResponse> {
        let command = BoxCommand::WifiConnect {
            ssid: ssid.to_string(),
            password: password.to_string(),
            country_code: country_code.to_string(),
        };
        if let Some(response) = self.try_ble(&command).await {
            return Ok(response);
        }
        self.http.connect_wifi(ssid, password, country_code).await
    }

    /// Diagnostic commands exist only over BLE, so their errors propagate.
    pub async fn run_raw_command(&self, command: &str) -> Result<ApiResponse> {
        self.send(&BoxCommand::Raw(command.to_string()))
            .await
            .map(ApiResponse::from)
    }

    pub async fn get_logs(&self, params: &Value) -> Result<ApiResponse> {
        self.send(&BoxCommand::Logs(params.to_string()))
            .await
            .map(ApiResponse::from)
    }

    async fn send(&self, command: &BoxCommand) -> Result<Response> {
        debug!("BLE command {}", command.verb());
        let response = self.write_and_wait_for_response(&command.to_wire()).await?;
        if response.is_empty() {
            return Err(TransportError::EmptyResponse);
        }
        Ok(response)
    }

    async fn try_ble(&self, command: &BoxCommand) -> Option<ApiResponse> {
        match self.send(command).await {
            Ok(response) => {
                info!("{} served over BLE", command.verb());
                Some(response.into())
            }
            Err(TransportError::NotConnected) => {
                debug!("No BLE connection, using HTTP for {}", command.verb());
                None
            }
            Err(e) => {
                warn!("BLE {} failed, falling back to HTTP: {}", command.verb(), e);
                None
            }
        }
    }

    /// Forget `channel` so the next command resolves the characteristic again.
    async fn evict(&self, channel: &Arc<CommandChannel>) {
        let mut cached = self.channel.lock().await;
        if cached.as_ref().is_some_and(|(_, c)| Arc::ptr_eq(c, channel)) {
            if let Some((_, stale)) = cached.take() {
                stale.cleanup();
            }
        }
    }

    async fn command_channel(&self) -> Result<Arc<CommandChannel>> {
        let target = self
            .connection
            .connected_target()
            .await?
            .ok_or(TransportError::NotConnected)?;

        let mut cached = self.channel.lock().await;
        if let Some((id, channel)) = &*cached {
            if *id == target.id {
                return Ok(channel.clone());
            }
            channel.cleanup();
        }

        let link = self.connection.open_command_link(&target).await?;
        let channel = Arc::new(CommandChannel::new(link));
        *cached = Some((target.id.clone(), channel.clone()));
        Ok(channel)
    }
}
