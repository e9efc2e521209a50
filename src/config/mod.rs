use std::path::Path;
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::core::bluetooth::{
    BLOX_DEVICE_NAME, DEFAULT_ADAPTER_TIMEOUT_SECS, DEFAULT_COMMAND_TIMEOUT_SECS,
    DEFAULT_HTTP_BASE_URL, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_SCAN_DURATION_SECS,
    DEFAULT_STABILIZATION_DELAY_MS, UUID_BLOX_COMMAND_CHAR, UUID_BLOX_SERVICE,
};
use crate::error::Result;
use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "transport_config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Advertised name (or name fragment) of the appliance.
    pub device_name: String,

    /// Fixed hardware identifier of the appliance, when known.
    pub hardware_id: Option<String>,

    pub service_uuid: Uuid,

    /// Characteristic that accepts commands and notifies responses.
    pub command_characteristic_uuid: Uuid,

    /// Length of the discovery window.
    pub scan_duration_secs: u64,

    /// Pause after connecting before the link is used.
    pub stabilization_delay_ms: u64,

    pub adapter_timeout_secs: u64,

    pub command_timeout_secs: u64,

    /// Base URL of the appliance's local HTTP API.
    pub http_base_url: String,

    pub http_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            device_name: BLOX_DEVICE_NAME.to_string(),
            hardware_id: None,
            service_uuid: UUID_BLOX_SERVICE,
            command_characteristic_uuid: UUID_BLOX_COMMAND_CHAR,
            scan_duration_secs: DEFAULT_SCAN_DURATION_SECS,
            stabilization_delay_ms: DEFAULT_STABILIZATION_DELAY_MS,
            adapter_timeout_secs: DEFAULT_ADAPTER_TIMEOUT_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            http_base_url: DEFAULT_HTTP_BASE_URL.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl TransportConfig {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_millis(self.stabilization_delay_ms)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Loads the config from a configuration file.
    pub async fn load(file_path: &Path) -> Result<Self> {
        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the config to a configuration file.
    pub async fn save(&self, file_path: &Path) -> Result<()> {
        if let Some(config_dir) = file_path.parent() {
            ensure_directory_exists(config_dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize transport config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;

        info!("Transport config saved to {:?}.", file_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"device_name":"Blox-7","scan_duration_secs":8}"#).unwrap();
        assert_eq!(config.device_name, "Blox-7");
        assert_eq!(config.scan_duration(), Duration::from_secs(8));
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.http_timeout(), Duration::from_secs(15));
        assert_eq!(config.service_uuid, UUID_BLOX_SERVICE);
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("blox-transport-{}", Uuid::new_v4()));
        let path = dir.join("nested").join(CONFIG_FILE_NAME);
        let config = TransportConfig {
            hardware_id: Some("AA:BB:CC:DD:EE:FF".into()),
            stabilization_delay_ms: 250,
            ..TransportConfig::default()
        };

        config.save(&path).await.unwrap();
        let loaded = TransportConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_file_yields_default() {
        let path = std::env::temp_dir().join(format!("absent-{}.json", Uuid::new_v4()));
        assert_eq!(TransportConfig::load(&path).await.unwrap(), TransportConfig::default());
    }
}
