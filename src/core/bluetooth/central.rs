//! Seams between the transport logic and a concrete BLE stack.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::notification::{NotificationStream, Subscription};
use crate::core::bluetooth::types::{ConnectionStatus, PeripheralHandle};
use crate::error::Result;

/// Adapter-level BLE operations the connection manager relies on.
#[async_trait::async_trait]
pub trait BleCentral: Send + Sync + 'static {
    /// Request and check OS-level Bluetooth permissions. Platforms without a
    /// runtime permission model grant them implicitly.
    async fn request_permissions(&self) -> Result<bool> {
        Ok(true)
    }

    /// Wait until the adapter is powered and usable.
    async fn ensure_powered(&self, timeout: Duration) -> Result<()>;

    /// Peripherals the system currently holds a connection to.
    async fn connected_peripherals(&self) -> Result<Vec<PeripheralHandle>>;

    /// Start discovery. Advertisements flow until the stream is dropped.
    async fn scan(&self) -> Result<ScanStream>;

    async fn connect(&self, peripheral: &PeripheralHandle) -> Result<()>;

    async fn disconnect(&self, peripheral: &PeripheralHandle) -> Result<()>;

    async fn is_connected(&self, peripheral: &PeripheralHandle) -> bool;

    /// Resolve the characteristic used for command exchange.
    async fn open_link(
        &self,
        peripheral: &PeripheralHandle,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    ) -> Result<Arc<dyn GattLink>>;
}

/// A single characteristic that accepts writes and emits notifications.
#[async_trait::async_trait]
pub trait GattLink: Send + Sync {
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Enable notifications. Dropping the returned stream disables them.
    async fn subscribe(&self) -> Result<NotificationStream>;
}

/// Lets a caller (typically the user) pick among several matching devices.
#[async_trait::async_trait]
pub trait DeviceSelector: Send + Sync {
    /// Returns the id of the chosen candidate, or `None` to abort.
    async fn select(&self, candidates: &[PeripheralHandle]) -> Option<String>;
}

pub type StatusCallback = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// Discovered advertisements; scanning stops when this is dropped.
pub struct ScanStream {
    receiver: mpsc::Receiver<PeripheralHandle>,
    _subscription: Subscription,
}

impl ScanStream {
    pub fn new(receiver: mpsc::Receiver<PeripheralHandle>, cancel_token: CancellationToken) -> Self {
        Self {
            receiver,
            _subscription: Subscription::new(cancel_token),
        }
    }

    pub async fn next(&mut self) -> Option<PeripheralHandle> {
        self.receiver.recv().await
    }
}
