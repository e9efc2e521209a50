//! `bluest` implementation of the BLE seams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bluest::{Adapter, Characteristic, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::central::{BleCentral, GattLink, ScanStream};
use crate::core::bluetooth::notification::{NotificationStream, forward_notifications};
use crate::core::bluetooth::types::PeripheralHandle;
use crate::error::{Result, TransportError};

/// Central backed by the platform's default Bluetooth adapter.
#[derive(Clone)]
pub struct BluestCentral {
    adapter: Adapter,
    /// Map of device ids to devices seen so far
    devices: Arc<Mutex<HashMap<String, Device>>>,
}

impl BluestCentral {
    pub async fn new() -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| TransportError::AdapterUnavailable("no Bluetooth adapter found".into()))?;
        Ok(Self {
            adapter,
            devices: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn remember(devices: &Mutex<HashMap<String, Device>>, device: &Device) -> String {
        let id = device.id().to_string();
        if let Ok(mut devices) = devices.lock() {
            devices.insert(id.clone(), device.clone());
        }
        id
    }

    fn lookup(&self, peripheral: &PeripheralHandle) -> Result<Device> {
        self.devices
            .lock()
            .ok()
            .and_then(|devices| devices.get(&peripheral.id).cloned())
            .ok_or_else(|| TransportError::Gatt(format!("unknown device: {}", peripheral.id)))
    }
}

#[async_trait::async_trait]
impl BleCentral for BluestCentral {
    async fn ensure_powered(&self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.adapter.wait_available()).await {
            Ok(result) => {
                result?;
                info!("Bluetooth adapter is available.");
                Ok(())
            }
            Err(_) => Err(TransportError::AdapterUnavailable(format!(
                "adapter not available after {:?}",
                timeout
            ))),
        }
    }

    async fn connected_peripherals(&self) -> Result<Vec<PeripheralHandle>> {
        let connected = self.adapter.connected_devices().await?;
        Ok(connected
            .iter()
            .map(|device| {
                let id = Self::remember(&self.devices, device);
                PeripheralHandle::new(id, device.name().ok(), None)
            })
            .collect())
    }

    async fn scan(&self) -> Result<ScanStream> {
        info!("Starting bluetooth scan");
        let (sender, receiver) = mpsc::channel(32);
        let (ready_tx, ready_rx) = oneshot::channel();
        let cancel_token = CancellationToken::new();
        let cancel_for_task = cancel_token.clone();
        let adapter = self.adapter.clone();
        let devices = self.devices.clone();

        tokio::spawn(async move {
            let mut scan_stream = match adapter.scan(&[]).await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(TransportError::from(e)));
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = cancel_for_task.cancelled() => break,
                    result = scan_stream.next() => match result {
                        Some(discovered) => {
                            debug!("Found device - Device: {:?}, RSSI: {:?}", discovered.device, discovered.rssi);
                            let id = Self::remember(&devices, &discovered.device);
                            let name = discovered
                                .adv_data
                                .local_name
                                .clone()
                                .or_else(|| discovered.device.name().ok());
                            let handle = PeripheralHandle::new(id, name, discovered.rssi);
                            if sender.send(handle).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    },
                }
            }
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(ScanStream::new(receiver, cancel_token)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::AdapterUnavailable("scan task ended".into())),
        }
    }

    async fn connect(&self, peripheral: &PeripheralHandle) -> Result<()> {
        let device = self.lookup(peripheral)?;
        if !device.is_connected().await {
            info!("Initiating connection to {}...", peripheral.id);
            self.adapter.connect_device(&device).await?;
        }
        Ok(())
    }

    async fn disconnect(&self, peripheral: &PeripheralHandle) -> Result<()> {
        let device = self.lookup(peripheral)?;
        if device.is_connected().await {
            info!("Disconnecting from device {}", peripheral.id);
            self.adapter.disconnect_device(&device).await?;
        } else {
            info!("Device {} not connected", peripheral.id);
        }
        Ok(())
    }

    async fn is_connected(&self, peripheral: &PeripheralHandle) -> bool {
        match self.lookup(peripheral) {
            Ok(device) => device.is_connected().await,
            Err(_) => false,
        }
    }

    async fn open_link(
        &self,
        peripheral: &PeripheralHandle,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    ) -> Result<Arc<dyn GattLink>> {
        let device = self.lookup(peripheral)?;

        info!("Discovering services on {}...", peripheral.id);
        let services = device.services().await?;
        let service = services
            .iter()
            .find(|s| s.uuid() == service_uuid)
            .ok_or_else(|| {
                for service in &services {
                    debug!("Available service: {}", service.uuid());
                }
                TransportError::Gatt(format!("Blox service not found: {}", service_uuid))
            })?
            .clone();

        let characteristic = service
            .characteristics()
            .await?
            .into_iter()
            .find(|c| c.uuid() == characteristic_uuid)
            .ok_or_else(|| {
                error!("Command characteristic {} missing", characteristic_uuid);
                TransportError::Gatt(format!("Command characteristic not found: {}", characteristic_uuid))
            })?;

        info!("Found command characteristic: {}", characteristic.uuid());
        Ok(Arc::new(BluestLink::new(characteristic)))
    }
}

#[derive(Clone)]
pub struct BluestLink {
    characteristic: Characteristic,
}

impl BluestLink {
    pub fn new(characteristic: Characteristic) -> Self {
        Self { characteristic }
    }
}

#[async_trait::async_trait]
impl GattLink for BluestLink {
    async fn write(&self, data: &[u8]) -> Result<()> {
        debug!("Writing {} bytes to {}", data.len(), self.characteristic.uuid());
        self.characteristic.write(data).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<NotificationStream> {
        forward_notifications(self.characteristic.clone()).await
    }
}
