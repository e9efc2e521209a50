//! Application commands
//! This module defines the operations the command line can invoke.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::info;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::core::bluetooth::{
    BleCentral, BluetoothScanner, ConnectOptions, ConnectionStatus, DeviceSelector, PeripheralHandle,
    StatusCallback, TargetMatcher,
};
use crate::state::AppState;

/// Asks on the terminal which of several appliances to use.
pub struct PromptSelector;

#[async_trait::async_trait]
impl DeviceSelector for PromptSelector {
    async fn select(&self, candidates: &[PeripheralHandle]) -> Option<String> {
        eprintln!("Several Blox devices were found:");
        for (i, candidate) in candidates.iter().enumerate() {
            eprintln!(
                "  [{}] {} ({}) RSSI {:?}",
                i,
                candidate.name.as_deref().unwrap_or("Unknown"),
                candidate.id,
                candidate.rssi
            );
        }
        eprint!("Select a device: ");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let line = lines.next_line().await.ok()??;
        let index: usize = line.trim().parse().ok()?;
        candidates.get(index).map(|c| c.id.clone())
    }
}

fn connect_options() -> ConnectOptions {
    let on_status_change: StatusCallback = Arc::new(|status: ConnectionStatus| {
        info!("Connection status: {:?}", status);
    });
    ConnectOptions {
        on_multiple_devices_found: Some(Arc::new(PromptSelector)),
        on_status_change: Some(on_status_change),
    }
}

/// Scans for appliances without connecting
pub async fn scan_devices(app_state: &AppState) -> Result<Value> {
    let transport = app_state.get_transport_arc();
    let central = transport.connection().central().clone();
    central.ensure_powered(app_state.config.adapter_timeout()).await?;

    let matcher = TargetMatcher::new(
        app_state.config.device_name.clone(),
        app_state.config.hardware_id.clone(),
    );
    let scanner = BluetoothScanner::new(matcher, app_state.config.scan_duration());
    let devices = scanner.discover(central.as_ref()).await?;
    Ok(serde_json::to_value(devices)?)
}

/// Connects to the appliance
pub async fn connect_to_device(app_state: &AppState) -> Result<Value> {
    let transport = app_state.get_transport_arc();
    if !transport.connect(&connect_options()).await {
        return Err(anyhow!("Could not connect to a Blox device"));
    }
    let device = transport.connection().active_peripheral();
    Ok(json!({ "connected": true, "device": device }))
}

async fn ensure_connected(app_state: &AppState) {
    let transport = app_state.get_transport_arc();
    // BLE is optional here; the façade falls back to HTTP when this fails.
    if !transport.connect(&connect_options()).await {
        info!("Continuing without BLE");
    }
}

pub async fn wifi_list(app_state: &AppState) -> Result<Value> {
    ensure_connected(app_state).await;
    Ok(app_state.get_transport_arc().get_wifi_list().await?.data)
}

pub async fn wifi_status(app_state: &AppState) -> Result<Value> {
    ensure_connected(app_state).await;
    Ok(app_state.get_transport_arc().get_wifi_status().await?.data)
}

pub async fn wifi_connect(app_state: &AppState, ssid: &str, password: &str, country_code: &str) -> Result<Value> {
    ensure_connected(app_state).await;
    let response = app_state
        .get_transport_arc()
        .connect_wifi(ssid, password, country_code)
        .await?;
    Ok(response.data)
}

pub async fn raw_command(app_state: &AppState, command: &str) -> Result<Value> {
    connect_to_device(app_state).await?;
    Ok(app_state.get_transport_arc().run_raw_command(command).await?.data)
}

pub async fn logs(app_state: &AppState, params: &str) -> Result<Value> {
    let params: Value = serde_json::from_str(params)?;
    connect_to_device(app_state).await?;
    Ok(app_state.get_transport_arc().get_logs(&params).await?.data)
}

pub async fn disconnect(app_state: &AppState) -> Result<()> {
    let transport = app_state.get_transport_arc();
    transport.disconnect().await?;
    Ok(())
}
