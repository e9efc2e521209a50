//! Mock BLE central, GATT link and HTTP API for integration tests.
//!
//! Every call is recorded so tests can assert on which transport served a
//! request without touching a real adapter or network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use blox_transport_lib::core::HttpApi;
use blox_transport_lib::core::bluetooth::{
    ApiResponse, BleCentral, DeviceSelector, GattLink, NotificationStream, PeripheralHandle,
    ScanStream,
};
use blox_transport_lib::{Result, TransportError};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub fn peripheral(id: &str, name: &str, rssi: Option<i16>) -> PeripheralHandle {
    PeripheralHandle::new(id.to_string(), Some(name.to_string()), rssi)
}

// ── MockLink ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MockLink {
    pub writes: Mutex<Vec<String>>,
    pub scripted: Mutex<VecDeque<Vec<String>>>,
    notifier: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    pub fail_write: bool,
}

impl MockLink {
    pub fn failing() -> Self {
        Self {
            fail_write: true,
            ..Default::default()
        }
    }

    /// Queue the notifications sent back after the next write.
    pub fn respond_with(&self, payloads: &[&str]) {
        self.scripted
            .lock()
            .unwrap()
            .push_back(payloads.iter().map(|p| p.to_string()).collect());
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GattLink for MockLink {
    async fn write(&self, data: &[u8]) -> Result<()> {
        if self.fail_write {
            return Err(TransportError::Gatt("GATT write failed".into()));
        }
        self.writes
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(data).into_owned());

        let scripted = self.scripted.lock().unwrap().pop_front();
        let sender = self.notifier.lock().unwrap().clone();
        if let (Some(payloads), Some(sender)) = (scripted, sender) {
            for payload in payloads {
                let _ = sender.try_send(payload.into_bytes());
            }
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<NotificationStream> {
        let (tx, rx) = mpsc::channel(32);
        *self.notifier.lock().unwrap() = Some(tx);
        Ok(NotificationStream::new(rx, CancellationToken::new()))
    }
}

// ── MockCentral ───────────────────────────────────────────────

pub struct MockCentral {
    pub permissions_granted: bool,
    pub powered: bool,
    pub fail_connect: bool,
    pub advertisements: Vec<PeripheralHandle>,
    pub connected: Mutex<Vec<PeripheralHandle>>,
    pub connect_calls: Mutex<Vec<String>>,
    pub disconnect_calls: Mutex<Vec<String>>,
    pub scans: Mutex<usize>,
    pub fail_scan: bool,
    /// Links handed out by successive `open_link` calls before falling back to `link`.
    pub queued_links: Mutex<VecDeque<Arc<MockLink>>>,
    pub open_link_calls: Mutex<usize>,
    pub link: Arc<MockLink>,
}

impl Default for MockCentral {
    fn default() -> Self {
        Self {
            permissions_granted: true,
            powered: true,
            fail_connect: false,
            advertisements: Vec::new(),
            connected: Mutex::new(Vec::new()),
            connect_calls: Mutex::new(Vec::new()),
            disconnect_calls: Mutex::new(Vec::new()),
            scans: Mutex::new(0),
            fail_scan: false,
            queued_links: Mutex::new(VecDeque::new()),
            open_link_calls: Mutex::new(0),
            link: Arc::new(MockLink::default()),
        }
    }
}

impl MockCentral {
    pub fn with_connected(peripherals: Vec<PeripheralHandle>) -> Self {
        Self {
            connected: Mutex::new(peripherals),
            ..Default::default()
        }
    }

    pub fn connect_calls(&self) -> Vec<String> {
        self.connect_calls.lock().unwrap().clone()
    }

    pub fn scan_count(&self) -> usize {
        *self.scans.lock().unwrap()
    }

    pub fn open_link_count(&self) -> usize {
        *self.open_link_calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl BleCentral for MockCentral {
    async fn request_permissions(&self) -> Result<bool> {
        Ok(self.permissions_granted)
    }

    async fn ensure_powered(&self, _timeout: Duration) -> Result<()> {
        if self.powered {
            Ok(())
        } else {
            Err(TransportError::AdapterUnavailable("powered off".into()))
        }
    }

    async fn connected_peripherals(&self) -> Result<Vec<PeripheralHandle>> {
        Ok(self.connected.lock().unwrap().clone())
    }

    async fn scan(&self) -> Result<ScanStream> {
        *self.scans.lock().unwrap() += 1;
        if self.fail_scan {
            return Err(TransportError::AdapterUnavailable("scan refused".into()));
        }
        let (tx, rx) = mpsc::channel(self.advertisements.len().max(1));
        for advertisement in &self.advertisements {
            let _ = tx.try_send(advertisement.clone());
        }
        Ok(ScanStream::new(rx, CancellationToken::new()))
    }

    async fn connect(&self, peripheral: &PeripheralHandle) -> Result<()> {
        self.connect_calls.lock().unwrap().push(peripheral.id.clone());
        if self.fail_connect {
            return Err(TransportError::Gatt("connection refused".into()));
        }
        self.connected.lock().unwrap().push(peripheral.clone());
        Ok(())
    }

    async fn disconnect(&self, peripheral: &PeripheralHandle) -> Result<()> {
        self.disconnect_calls.lock().unwrap().push(peripheral.id.clone());
        self.connected.lock().unwrap().retain(|p| p.id != peripheral.id);
        Ok(())
    }

    async fn is_connected(&self, peripheral: &PeripheralHandle) -> bool {
        self.connected.lock().unwrap().iter().any(|p| p.id == peripheral.id)
    }

    async fn open_link(
        &self,
        _peripheral: &PeripheralHandle,
        _service_uuid: Uuid,
        _characteristic_uuid: Uuid,
    ) -> Result<Arc<dyn GattLink>> {
        *self.open_link_calls.lock().unwrap() += 1;
        let link = self
            .queued_links
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.link.clone());
        Ok(link)
    }
}

// ── MockSelector ──────────────────────────────────────────────

pub struct MockSelector {
    pub choice: Option<String>,
    pub offered: Mutex<Vec<String>>,
}

impl MockSelector {
    pub fn choosing(id: Option<&str>) -> Self {
        Self {
            choice: id.map(String::from),
            offered: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl DeviceSelector for MockSelector {
    async fn select(&self, candidates: &[PeripheralHandle]) -> Option<String> {
        *self.offered.lock().unwrap() = candidates.iter().map(|c| c.id.clone()).collect();
        self.choice.clone()
    }
}

// ── MockHttp ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MockHttp {
    pub calls: Mutex<Vec<String>>,
    pub fail: bool,
}

impl MockHttp {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, call: String) -> Result<ApiResponse> {
        self.calls.lock().unwrap().push(call.clone());
        if self.fail {
            return Err(TransportError::HttpStatus(503));
        }
        Ok(ApiResponse {
            data: json!({ "source": "http", "call": call }),
        })
    }
}

#[async_trait::async_trait]
impl HttpApi for MockHttp {
    async fn get_wifi_list(&self) -> Result<ApiResponse> {
        self.respond("wifi/list".into())
    }

    async fn get_wifi_status(&self) -> Result<ApiResponse> {
        self.respond("wifi/status".into())
    }

    async fn connect_wifi(&self, ssid: &str, password: &str, country_code: &str) -> Result<ApiResponse> {
        self.respond(format!("wifi/connect {} {} {}", ssid, password, country_code))
    }
}
