use std::time::Duration;

use log::{debug, info};
use tokio::time::Instant;

use crate::core::bluetooth::central::BleCentral;
use crate::core::bluetooth::types::PeripheralHandle;
use crate::error::Result;

/// Identifies the Blox appliance among discovered peripherals.
#[derive(Debug, Clone)]
pub struct TargetMatcher {
    pub name: String,
    pub hardware_id: Option<String>,
}

impl TargetMatcher {
    pub fn new(name: impl Into<String>, hardware_id: Option<String>) -> Self {
        Self {
            name: name.into(),
            hardware_id,
        }
    }

    /// Returns true if this peripheral is the target appliance
    pub fn matches(&self, peripheral: &PeripheralHandle) -> bool {
        let id_matches = self
            .hardware_id
            .as_ref()
            .is_some_and(|id| id.eq_ignore_ascii_case(&peripheral.id));
        let name_matches = peripheral
            .name
            .as_ref()
            .is_some_and(|name| name.contains(&self.name));
        id_matches || name_matches
    }
}

pub struct BluetoothScanner {
    matcher: TargetMatcher,
    scan_duration: Duration,
}

impl BluetoothScanner {
    pub fn new(matcher: TargetMatcher, scan_duration: Duration) -> Self {
        Self {
            matcher,
            scan_duration,
        }
    }

    pub fn matcher(&self) -> &TargetMatcher {
        &self.matcher
    }

    /// Scan for the full window and return every matching peripheral, one
    /// entry per id, in order of first discovery. A repeated advertisement
    /// refreshes the entry's signal strength.
    pub async fn discover<C: BleCentral + ?Sized>(&self, central: &C) -> Result<Vec<PeripheralHandle>> {
        let mut scan_stream = central.scan().await?;
        let deadline = Instant::now() + self.scan_duration;
        let mut candidates: Vec<PeripheralHandle> = Vec::new();

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                result = scan_stream.next() => match result {
                    Some(peripheral) => {
                        debug!("Found device - ID: {}, Name: {:?}, RSSI: {:?}", peripheral.id, peripheral.name, peripheral.rssi);
                        if !self.matcher.matches(&peripheral) {
                            continue;
                        }
                        match candidates.iter_mut().find(|c| c.id == peripheral.id) {
                            Some(existing) => existing.rssi = peripheral.rssi.or(existing.rssi),
                            None => {
                                info!("Found Blox device: ID: {}, Name: {:?}, RSSI: {:?}", peripheral.id, peripheral.name, peripheral.rssi);
                                candidates.push(peripheral);
                            }
                        }
                    }
                    None => {
                        info!("Bluetooth scan stream has ended.");
                        break;
                    }
                },
            }
        }

        info!("Scan complete, {} candidate(s)", candidates.len());
        Ok(candidates)
    }
}

/// The candidate with the strongest signal. Missing RSSI ranks lowest and
/// ties keep the earliest discovery.
pub fn strongest(candidates: &[PeripheralHandle]) -> Option<&PeripheralHandle> {
    candidates.iter().reduce(|best, candidate| {
        if candidate.rssi > best.rssi {
            candidate
        } else {
            best
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use crate::core::bluetooth::central::{GattLink, ScanStream};
    use crate::error::TransportError;

    fn handle(id: &str, name: Option<&str>, rssi: Option<i16>) -> PeripheralHandle {
        PeripheralHandle::new(id.into(), name.map(String::from), rssi)
    }

    #[test]
    fn matches_by_name_or_hardware_id() {
        let matcher = TargetMatcher::new("Blox", Some("AA:BB:CC:DD:EE:FF".into()));
        assert!(matcher.matches(&handle("x", Some("Blox-1234"), None)));
        assert!(matcher.matches(&handle("aa:bb:cc:dd:ee:ff", None, None)));
        assert!(!matcher.matches(&handle("y", Some("Headphones"), None)));
        assert!(!matcher.matches(&handle("z", None, None)));
    }

    #[test]
    fn strongest_prefers_higher_rssi_then_earliest() {
        let candidates = vec![
            handle("a", Some("Blox"), Some(-70)),
            handle("b", Some("Blox"), Some(-40)),
            handle("c", Some("Blox"), Some(-40)),
            handle("d", Some("Blox"), None),
        ];
        assert_eq!(strongest(&candidates).map(|c| c.id.as_str()), Some("b"));
        assert!(strongest(&[]).is_none());
    }

    /// Central whose scan stays open until the test drops its sender.
    struct OpenScan {
        receiver: std::sync::Mutex<Option<mpsc::Receiver<PeripheralHandle>>>,
    }

    #[async_trait::async_trait]
    impl BleCentral for OpenScan {
        async fn ensure_powered(&self, _timeout: Duration) -> Result<()> {
            Ok(())
        }

        async fn connected_peripherals(&self) -> Result<Vec<PeripheralHandle>> {
            Ok(Vec::new())
        }

        async fn scan(&self) -> Result<ScanStream> {
            let receiver = self
                .receiver
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| TransportError::AdapterUnavailable("already scanning".into()))?;
            Ok(ScanStream::new(receiver, CancellationToken::new()))
        }

        async fn connect(&self, _peripheral: &PeripheralHandle) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&self, _peripheral: &PeripheralHandle) -> Result<()> {
            Ok(())
        }

        async fn is_connected(&self, _peripheral: &PeripheralHandle) -> bool {
            false
        }

        async fn open_link(
            &self,
            _peripheral: &PeripheralHandle,
            _service_uuid: Uuid,
            _characteristic_uuid: Uuid,
        ) -> Result<Arc<dyn GattLink>> {
            Err(TransportError::NotConnected)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn discover_runs_the_full_window_and_refreshes_rssi() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(handle("blox-1", Some("Blox"), Some(-80))).await.unwrap();
        tx.send(handle("speaker", Some("Speaker"), Some(-20))).await.unwrap();
        tx.send(handle("blox-1", Some("Blox"), Some(-50))).await.unwrap();
        tx.send(handle("blox-1", Some("Blox"), None)).await.unwrap();
        let central = OpenScan {
            receiver: std::sync::Mutex::new(Some(rx)),
        };
        let scanner = BluetoothScanner::new(TargetMatcher::new("Blox", None), Duration::from_secs(5));

        let started = Instant::now();
        let found = scanner.discover(&central).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "blox-1");
        assert_eq!(found[0].rssi, Some(-50));
        drop(tx);
    }
}
