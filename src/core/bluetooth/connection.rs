//! Bluetooth connection handling for the Blox appliance
//! This module finds the appliance and keeps at most one active connection to it

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{info, warn};
use uuid::Uuid;

use crate::config::TransportConfig;
use crate::core::bluetooth::central::{BleCentral, DeviceSelector, GattLink, StatusCallback};
use crate::core::bluetooth::scanner::{BluetoothScanner, TargetMatcher, strongest};
use crate::core::bluetooth::types::{ConnectionStatus, PeripheralHandle};
use crate::error::Result;

/// Callbacks accepted by [`ConnectionManager::connect`].
#[derive(Clone, Default)]
pub struct ConnectOptions {
    /// Asked to choose when more than one appliance is discovered.
    pub on_multiple_devices_found: Option<Arc<dyn DeviceSelector>>,
    pub on_status_change: Option<StatusCallback>,
}

/// Connection manager for the appliance
pub struct ConnectionManager<C: BleCentral> {
    central: Arc<C>,
    scanner: BluetoothScanner,
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
    adapter_timeout: Duration,
    stabilization_delay: Duration,
    status: Mutex<ConnectionStatus>,
    /// Currently connected device
    active: Mutex<Option<PeripheralHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<C: BleCentral> ConnectionManager<C> {
    pub fn new(central: Arc<C>, config: &TransportConfig) -> Self {
        let matcher = TargetMatcher::new(config.device_name.clone(), config.hardware_id.clone());
        Self {
            central,
            scanner: BluetoothScanner::new(matcher, config.scan_duration()),
            service_uuid: config.service_uuid,
            characteristic_uuid: config.command_characteristic_uuid,
            adapter_timeout: config.adapter_timeout(),
            stabilization_delay: config.stabilization_delay(),
            status: Mutex::new(ConnectionStatus::Idle),
            active: Mutex::new(None),
        }
    }

    pub fn central(&self) -> &Arc<C> {
        &self.central
    }

    pub fn status(&self) -> ConnectionStatus {
        *lock(&self.status)
    }

    pub fn active_peripheral(&self) -> Option<PeripheralHandle> {
        lock(&self.active).clone()
    }

    /// Connect to the appliance. Never fails: every error is logged and
    /// reported as `false` plus a `Failed` status.
    pub async fn connect(&self, options: &ConnectOptions) -> bool {
        self.set_status(ConnectionStatus::Connecting, options);

        let connected = match self.try_connect(options).await {
            Ok(connected) => connected,
            Err(e) => {
                warn!("Connection attempt failed: {}", e);
                false
            }
        };

        let status = if connected {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Failed
        };
        self.set_status(status, options);
        connected
    }

    async fn try_connect(&self, options: &ConnectOptions) -> Result<bool> {
        if !self.central.request_permissions().await? {
            warn!("Bluetooth permissions not granted");
            return Ok(false);
        }

        self.central.ensure_powered(self.adapter_timeout).await?;

        info!("Checking for connected devices");
        let connected = self.central.connected_peripherals().await?;
        if let Some(target) = connected.iter().find(|p| self.scanner.matcher().matches(p)) {
            info!("Blox device {} already connected", target.id);
            *lock(&self.active) = Some(target.clone());
            return Ok(true);
        }

        for other in &connected {
            info!("Disconnecting unrelated device {}", other.id);
            if let Err(e) = self.central.disconnect(other).await {
                warn!("Failed to disconnect {}: {}", other.id, e);
            }
        }

        let candidates = self.scanner.discover(self.central.as_ref()).await?;
        let selected = match (&options.on_multiple_devices_found, candidates.len()) {
            (_, 0) => {
                info!("No Blox device found");
                return Ok(false);
            }
            (Some(selector), n) if n > 1 => {
                info!("{} Blox devices found, asking for a choice", n);
                let Some(chosen) = selector.select(&candidates).await else {
                    info!("Device selection was cancelled");
                    return Ok(false);
                };
                match candidates.iter().find(|c| c.id == chosen) {
                    Some(candidate) => candidate.clone(),
                    None => {
                        warn!("Selected device {} was not among the candidates", chosen);
                        return Ok(false);
                    }
                }
            }
            _ => match strongest(&candidates) {
                Some(candidate) => candidate.clone(),
                None => return Ok(false),
            },
        };

        info!("Connecting to {} (RSSI {:?})", selected.id, selected.rssi);
        self.central.connect(&selected).await?;
        tokio::time::sleep(self.stabilization_delay).await;

        info!("Connected to Blox device {}", selected.id);
        *lock(&self.active) = Some(selected);
        Ok(true)
    }

    /// The appliance, if the system currently holds a connection to it.
    pub async fn connected_target(&self) -> Result<Option<PeripheralHandle>> {
        let connected = self.central.connected_peripherals().await?;
        Ok(connected
            .into_iter()
            .find(|p| self.scanner.matcher().matches(p)))
    }

    /// Checks if the active device is still connected.
    pub async fn is_connected(&self) -> bool {
        match self.active_peripheral() {
            Some(peripheral) => self.central.is_connected(&peripheral).await,
            None => false,
        }
    }

    /// Resolve the command characteristic on `peripheral`.
    pub async fn open_command_link(&self, peripheral: &PeripheralHandle) -> Result<Arc<dyn GattLink>> {
        self.central
            .open_link(peripheral, self.service_uuid, self.characteristic_uuid)
            .await
    }

    /// Disconnect from the active device, if any.
    pub async fn disconnect(&self) -> Result<()> {
        let active = lock(&self.active).take();
        *lock(&self.status) = ConnectionStatus::Idle;
        match active {
            Some(peripheral) => self.central.disconnect(&peripheral).await,
            None => {
                info!("No device connected");
                Ok(())
            }
        }
    }

    fn set_status(&self, status: ConnectionStatus, options: &ConnectOptions) {
        *lock(&self.status) = status;
        if let Some(callback) = &options.on_status_change {
            callback(status);
        }
    }
}
